//! Centre-up against saved region files and a scripted TCC.

use std::sync::Arc;

use acquisition::{CentreUp, CentreUpError, CentreUpOptions, FieldGeometry, RegionFiles};
use approx::assert_relative_eq;
use hardware::tcc::mock::{MockHandle, MockTransport};
use hardware::tcc::{TccError, TccLink};
use shared::config_storage::ConfigStorage;
use shared::{AcquisitionConfig, Camera, FocalPosition, StaticPlateCatalog};
use tempfile::TempDir;

const STATUS_REPLIES: [&str; 2] = [
    "0 12 yourUserID=12",
    "999 12 instrumentNum=5;axisCmdState=tracking,tracking,tracking",
];

struct Fixture {
    _dir: TempDir,
    centre_up: CentreUp<MockTransport, RegionFiles>,
    handle: MockHandle,
}

/// Writes the config, the plate catalog and both region files to a temporary
/// config root, then builds everything from disk the way `centre_up` does.
fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let storage = ConfigStorage::with_path(dir.path().to_path_buf());
    storage.save_config(&AcquisitionConfig::default()).unwrap();
    // Hole chosen to reproduce the 224.10 arcsec reference rotation, not
    // taken from plate 9459 drilling data.
    storage
        .save_catalog(
            &StaticPlateCatalog::new()
                .with_cartridge(5, 9459)
                .with_off_axis_hole(9459, FocalPosition::new(-113.019, 0.0)),
        )
        .unwrap();

    let on_path = dir.path().join("on.reg");
    let off_path = dir.path().join("off.reg");
    std::fs::write(
        &on_path,
        "# Region file format: DS9 version 4.1\nimage\ncircle(1752.4199137070332,454.10706671426425,8.2)\n",
    )
    .unwrap();
    std::fs::write(
        &off_path,
        "# Region file format: DS9 version 4.1\nimage\ncircle(1743.7582798445776,422.31308483301365,7.9)\n",
    )
    .unwrap();

    let config = storage.get_config().unwrap().unwrap();
    let catalog = storage.get_catalog(&config).unwrap().unwrap();

    let (transport, handle) = MockTransport::new();
    handle.reply_to("device status", &STATUS_REPLIES);
    let link = TccLink::new(transport, Arc::new(catalog), config.tcc.clone());
    let regions = RegionFiles::new()
        .with_frame(Camera::OnAxis.frame(), on_path)
        .with_frame(Camera::OffAxis.frame(), off_path);

    Fixture {
        _dir: dir,
        centre_up: CentreUp::new(
            Arc::new(link),
            Some(regions),
            FieldGeometry::from_config(&config),
        ),
        handle,
    }
}

#[tokio::test]
async fn test_centre_up_applies_translation_and_rotation() {
    let Fixture {
        _dir,
        centre_up,
        handle,
    } = fixture();

    let outcome = centre_up.run(CentreUpOptions::default()).await.unwrap();
    assert!(outcome.applied);
    assert_eq!(outcome.plate_id, Some(9459));
    assert_relative_eq!(outcome.offset.ra_arcsec.unwrap(), 50.10407, epsilon = 1e-3);
    assert_relative_eq!(outcome.offset.dec_arcsec.unwrap(), -9.82976, epsilon = 1e-3);
    assert_relative_eq!(outcome.offset.rot_arcsec.unwrap(), 224.10, epsilon = 0.01);
    assert_eq!(outcome.centroids.on.unwrap().radius, Some(8.2));

    let state = centre_up.link().state();
    assert_eq!(state.my_user_id(), Some(12));
    assert_eq!(state.instrument_num(), Some(5));

    assert_eq!(
        handle.written_lines(),
        vec![
            "999 device status",
            "999 guideoffset 0.013918,-0.002730,0.062250,0.0,0.0",
        ]
    );
}

#[tokio::test]
async fn test_centre_up_twice_refreshes_status() {
    let Fixture {
        _dir,
        centre_up,
        handle,
    } = fixture();

    centre_up.run(CentreUpOptions::default()).await.unwrap();
    centre_up.run(CentreUpOptions::default()).await.unwrap();

    let status_polls = handle
        .written_lines()
        .iter()
        .filter(|line| line.ends_with("device status"))
        .count();
    assert_eq!(status_polls, 2);
}

#[tokio::test]
async fn test_centre_up_reconnects_once() {
    let Fixture {
        _dir,
        centre_up,
        handle,
    } = fixture();

    centre_up.link().connect().await.unwrap();
    handle.drop_connection();

    let outcome = centre_up.run(CentreUpOptions::default()).await.unwrap();
    assert!(outcome.applied);
    assert_eq!(handle.connect_attempts(), 2);
}

#[tokio::test]
async fn test_centre_up_fails_visibly_when_tcc_down() {
    let Fixture {
        _dir,
        centre_up,
        handle,
    } = fixture();
    handle.refuse_connections(true);

    let err = centre_up.run(CentreUpOptions::default()).await.unwrap_err();
    assert!(matches!(err, CentreUpError::Tcc(TccError::Connection(_))));
    assert_eq!(handle.connect_attempts(), 1);
    assert_eq!(handle.bytes_written(), 0);
}
