//! Connection management and request handling for the TCC.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use shared::{PlateCatalog, TccSettings};
use tracing::{debug, info, warn};

use super::protocol::{status_command, Keyword, OffsetRequest, ReplyLine};
use super::request::{PendingStatus, StatusRequest};
use super::state::TccState;
use super::transport::{LineReceiver, LineTransport};
use super::{LinkState, TccError, TccResult};

struct LinkShared {
    state: TccState,
    link_state: LinkState,
    /// Bumped on every connect and disconnect so a stale reader can tell it
    /// no longer owns the link.
    connection_id: u64,
    generation: u64,
    pending: Option<PendingStatus>,
}

fn lock(shared: &Mutex<LinkShared>) -> MutexGuard<'_, LinkShared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Client link to the Telescope Control Computer.
///
/// Reply lines are consumed by a background task that updates the tracked
/// [`TccState`] and completes the pending status request. Commands are
/// serialized through the transport lock.
pub struct TccLink<T: LineTransport> {
    transport: tokio::sync::Mutex<T>,
    shared: Arc<Mutex<LinkShared>>,
    catalog: Arc<dyn PlateCatalog>,
    settings: TccSettings,
}

impl<T: LineTransport> TccLink<T> {
    /// Create a link. Nothing is connected until [`connect`](Self::connect)
    /// or the first command.
    pub fn new(transport: T, catalog: Arc<dyn PlateCatalog>, settings: TccSettings) -> Self {
        Self {
            transport: tokio::sync::Mutex::new(transport),
            shared: Arc::new(Mutex::new(LinkShared {
                state: TccState::new(),
                link_state: LinkState::Disconnected,
                connection_id: 0,
                generation: 0,
                pending: None,
            })),
            catalog,
            settings,
        }
    }

    pub fn settings(&self) -> &TccSettings {
        &self.settings
    }

    pub fn catalog(&self) -> &Arc<dyn PlateCatalog> {
        &self.catalog
    }

    pub fn link_state(&self) -> LinkState {
        lock(&self.shared).link_state
    }

    /// Snapshot of the tracked telescope state.
    pub fn state(&self) -> TccState {
        lock(&self.shared).state.clone()
    }

    pub fn is_ok_to_offset(&self) -> bool {
        lock(&self.shared).state.is_ok_to_offset()
    }

    /// Feed one reply line, as the reader task does for every line received.
    pub fn handle_reply(&self, line: &str) {
        handle_line(
            &self.shared,
            self.catalog.as_ref(),
            self.settings.admin_cmd_id,
            line,
        );
    }

    /// Open the connection, replacing any existing one.
    pub async fn connect(&self) -> TccResult<()> {
        let mut transport = self.transport.lock().await;
        self.connect_locked(&mut transport).await
    }

    pub async fn disconnect(&self) {
        let mut transport = self.transport.lock().await;
        transport.disconnect().await;
        let mut shared = lock(&self.shared);
        shared.connection_id += 1;
        shared.link_state = LinkState::Disconnected;
        info!("Disconnected from TCC");
    }

    /// Clear the status fields and query the TCC for them again.
    ///
    /// Any request still pending fails with [`TccError::Superseded`]. If the
    /// link is down and cannot be re-established, the returned request has
    /// already failed and nothing was sent.
    pub async fn update_status(&self) -> StatusRequest {
        let mut transport = self.transport.lock().await;
        let id = {
            let mut shared = lock(&self.shared);
            shared.generation += 1;
            shared.generation
        };

        let reconnected = match self.ensure_connected(&mut transport).await {
            Ok(reconnected) => reconnected,
            Err(e) => {
                warn!("Status request {} not sent: {}", id, e);
                return StatusRequest::failed(id, e);
            }
        };

        let (request, pending) = StatusRequest::start(id, self.settings.status_timeout());
        {
            let mut shared = lock(&self.shared);
            shared.state.clear_status();
            if let Some(previous) = shared.pending.replace(pending.clone()) {
                if previous.fail(TccError::Superseded) {
                    debug!("Status request superseded by {}", id);
                }
            }
        }

        let line = status_command(self.settings.admin_cmd_id);
        if let Err(e) = self
            .write_line(&mut transport, &line, reconnected, false)
            .await
        {
            warn!("Status request {} failed: {}", id, e);
            let mut shared = lock(&self.shared);
            if shared
                .pending
                .as_ref()
                .is_some_and(|current| current.is_same(&pending))
            {
                shared.pending = None;
            }
            pending.fail(e);
        }
        request
    }

    /// Send a guide offset.
    ///
    /// Refuses with [`TccError::NotReady`] unless every axis is tracking, and
    /// with [`TccError::MissingData`] if the request has no components; in
    /// both cases nothing is written. Readiness is checked again after any
    /// reconnect, since a new session starts with unknown axis states.
    /// Completes once the command is written.
    pub async fn offset(&self, offset: &OffsetRequest) -> TccResult<()> {
        self.check_ready()?;
        if offset.is_empty() {
            return Err(TccError::MissingData(
                "offset has no ra, dec or rotation component".to_string(),
            ));
        }

        let mut transport = self.transport.lock().await;
        let reconnected = self.ensure_connected(&mut transport).await?;
        if reconnected {
            self.check_ready()?;
        }
        let line = offset.command(self.settings.admin_cmd_id);
        self.write_line(&mut transport, &line, reconnected, true).await?;
        info!(
            "Offset sent: ra={:?} dec={:?} rot={:?} arcsec",
            offset.ra_arcsec, offset.dec_arcsec, offset.rot_arcsec
        );
        Ok(())
    }

    fn check_ready(&self) -> TccResult<()> {
        let shared = lock(&self.shared);
        if shared.state.is_ok_to_offset() {
            Ok(())
        } else {
            Err(TccError::NotReady(shared.state.not_ready_reason()))
        }
    }

    async fn connect_locked(&self, transport: &mut T) -> TccResult<()> {
        lock(&self.shared).link_state = LinkState::Connecting;

        let rx = match transport.connect().await {
            Ok(rx) => rx,
            Err(e) => {
                lock(&self.shared).link_state = LinkState::Disconnected;
                return Err(TccError::Connection(format!(
                    "cannot connect to {}: {}",
                    self.settings.address(),
                    e
                )));
            }
        };

        let connection_id = {
            let mut shared = lock(&self.shared);
            shared.connection_id += 1;
            shared.link_state = LinkState::Connected;
            shared.state.reset();
            shared.connection_id
        };
        info!("Connected to TCC at {}", self.settings.address());
        self.spawn_reader(rx, connection_id);
        Ok(())
    }

    fn spawn_reader(&self, mut rx: LineReceiver, connection_id: u64) {
        let shared = Arc::clone(&self.shared);
        let catalog = Arc::clone(&self.catalog);
        let admin_cmd_id = self.settings.admin_cmd_id;

        tokio::spawn(async move {
            while let Some(line) = rx.recv().await {
                handle_line(&shared, catalog.as_ref(), admin_cmd_id, &line);
            }
            let mut shared = lock(&shared);
            if shared.connection_id == connection_id {
                shared.link_state = LinkState::Disconnected;
                warn!("TCC connection lost");
            }
        });
    }

    /// Reconnect if the link is down. Returns whether a reconnect happened.
    async fn ensure_connected(&self, transport: &mut T) -> TccResult<bool> {
        if transport.is_connected() {
            return Ok(false);
        }
        warn!("TCC link is down, reconnecting");
        self.connect_locked(transport).await?;
        Ok(true)
    }

    /// Write a line, reconnecting and retrying once on failure unless the
    /// caller has already spent its reconnect. With `requires_ready`, the
    /// retry is refused unless the new session reports every axis tracking.
    async fn write_line(
        &self,
        transport: &mut T,
        line: &str,
        reconnected: bool,
        requires_ready: bool,
    ) -> TccResult<()> {
        let err = match transport.write_line(line).await {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };
        if reconnected {
            lock(&self.shared).link_state = LinkState::Disconnected;
            return Err(TccError::Connection(format!("write failed: {err}")));
        }

        warn!("TCC write failed ({}), reconnecting", err);
        self.connect_locked(transport).await?;
        if requires_ready {
            self.check_ready()?;
        }
        transport.write_line(line).await.map_err(|e| {
            lock(&self.shared).link_state = LinkState::Disconnected;
            TccError::Connection(format!("write failed after reconnect: {e}"))
        })
    }
}

fn handle_line(
    shared: &Mutex<LinkShared>,
    catalog: &dyn PlateCatalog,
    admin_cmd_id: u32,
    line: &str,
) {
    let reply = match ReplyLine::parse(line) {
        Ok(reply) => reply,
        Err(e) => {
            warn!("Dropping TCC line: {}", e);
            return;
        }
    };

    let mut shared = lock(shared);
    let is_admin = reply.cmd_id == admin_cmd_id;
    for keyword in reply.keywords {
        match keyword {
            Keyword::YourUserId(user_id) if reply.cmd_id == 0 => {
                shared.state.set_my_user_id(user_id)
            }
            Keyword::InstrumentNum(num) if is_admin => {
                shared.state.set_instrument_num(num, catalog)
            }
            Keyword::AxisCmdState(states) if is_admin => shared.state.set_axis_states(states),
            Keyword::SecOrient(orientation) if is_admin => {
                shared.state.set_secondary_orientation(orientation)
            }
            _ => {}
        }
    }

    if shared.state.is_status_complete() {
        if let Some(pending) = shared.pending.take() {
            if pending.complete(&shared.state) {
                debug!(
                    "TCC status complete: instrument {:?}, plate {:?}",
                    shared.state.instrument_num(),
                    shared.state.plate_id()
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::tcc::mock::{MockHandle, MockTransport};
    use crate::tcc::{AxisCmdState, RequestState};
    use shared::StaticPlateCatalog;

    const STATUS_REPLY: &str = "999 12 instrumentNum=5;axisCmdState=tracking,tracking,tracking";

    fn link_with(settings: TccSettings) -> (TccLink<MockTransport>, MockHandle) {
        let (transport, handle) = MockTransport::new();
        let catalog = StaticPlateCatalog::new().with_cartridge(5, 9459);
        (TccLink::new(transport, Arc::new(catalog), settings), handle)
    }

    fn link() -> (TccLink<MockTransport>, MockHandle) {
        link_with(TccSettings::default())
    }

    fn make_ready(link: &TccLink<MockTransport>) {
        link.handle_reply(STATUS_REPLY);
        assert!(link.is_ok_to_offset());
    }

    #[tokio::test]
    async fn test_status_request_completes() {
        let (link, handle) = link();
        handle.reply_to("device status", &["0 12 yourUserID=12", STATUS_REPLY]);
        link.connect().await.unwrap();
        assert_eq!(link.link_state(), LinkState::Connected);

        let state = link.update_status().await.wait().await.unwrap();
        assert_eq!(state.my_user_id(), Some(12));
        assert_eq!(state.instrument_num(), Some(5));
        assert_eq!(state.plate_id(), Some(9459));
        assert!(state.is_ok_to_offset());
        assert_eq!(handle.written_lines(), vec!["999 device status"]);
    }

    #[tokio::test]
    async fn test_status_needs_both_fields() {
        let (link, handle) = link();
        link.connect().await.unwrap();
        let request = link.update_status().await;

        link.handle_reply("999 12 instrumentNum=5");
        assert_eq!(request.state(), RequestState::Running);

        link.handle_reply("999 12 axisCmdState=tracking,halted");
        assert!(request.is_done());
        assert!(!link.is_ok_to_offset());
        assert_eq!(handle.written_lines().len(), 1);
    }

    #[tokio::test]
    async fn test_status_keywords_from_other_commands_ignored() {
        let (link, _handle) = link();
        link.handle_reply("5 12 instrumentNum=5;axisCmdState=tracking");
        assert_eq!(link.state().instrument_num(), None);
        assert!(!link.is_ok_to_offset());
    }

    #[tokio::test]
    async fn test_malformed_line_dropped() {
        let (link, _handle) = link();
        link.handle_reply("999 12 instrumentNum=abc;axisCmdState=tracking");
        assert_eq!(link.state(), TccState::new());

        link.handle_reply("garbage");
        link.handle_reply("999 12 instrumentNum=5");
        assert_eq!(link.state().instrument_num(), Some(5));
    }

    #[tokio::test]
    async fn test_unknown_keywords_ignored() {
        let (link, _handle) = link();
        link.handle_reply("999 12 tccPos=1,2,3;axisCmdState=tracking;Foo=\"bar\"");
        assert_eq!(
            link.state().axis_states(),
            Some(&[AxisCmdState::Tracking][..])
        );
    }

    #[tokio::test]
    async fn test_offset_refused_when_not_ready() {
        let (link, handle) = link();
        link.connect().await.unwrap();

        let err = link
            .offset(&OffsetRequest::translation(1.0, 2.0))
            .await
            .unwrap_err();
        assert!(matches!(err, TccError::NotReady(_)));

        link.handle_reply("999 12 axisCmdState=");
        let err = link
            .offset(&OffsetRequest::translation(1.0, 2.0))
            .await
            .unwrap_err();
        assert!(matches!(err, TccError::NotReady(_)));
        assert_eq!(handle.bytes_written(), 0);
    }

    #[tokio::test]
    async fn test_offset_missing_data() {
        let (link, handle) = link();
        link.connect().await.unwrap();
        make_ready(&link);

        let err = link.offset(&OffsetRequest::default()).await.unwrap_err();
        assert!(matches!(err, TccError::MissingData(_)));
        assert_eq!(handle.bytes_written(), 0);
    }

    #[tokio::test]
    async fn test_offset_written() {
        let (link, handle) = link();
        link.connect().await.unwrap();
        make_ready(&link);

        link.offset(&OffsetRequest::translation(36.0, -36.0).with_rotation(3.6))
            .await
            .unwrap();
        assert_eq!(
            handle.written_lines(),
            vec!["999 guideoffset 0.010000,-0.010000,0.001000,0.0,0.0"]
        );
    }

    #[tokio::test]
    async fn test_offset_refused_after_reconnect() {
        let (link, handle) = link();
        link.connect().await.unwrap();
        make_ready(&link);
        handle.drop_connection();

        let err = link
            .offset(&OffsetRequest::translation(36.0, 0.0))
            .await
            .unwrap_err();
        assert!(matches!(err, TccError::NotReady(_)));
        assert_eq!(handle.connect_attempts(), 2);
        assert!(handle.written_lines().is_empty());
    }

    #[tokio::test]
    async fn test_offset_not_retried_on_unverified_session() {
        let (link, handle) = link();
        link.connect().await.unwrap();
        make_ready(&link);
        handle.fail_next_writes(1);

        let err = link
            .offset(&OffsetRequest::translation(36.0, 0.0))
            .await
            .unwrap_err();
        assert!(matches!(err, TccError::NotReady(_)));
        assert_eq!(handle.connect_attempts(), 2);
        assert!(handle.written_lines().is_empty());
    }

    #[tokio::test]
    async fn test_reconnects_once_when_down() {
        let (link, handle) = link();
        link.connect().await.unwrap();
        handle.drop_connection();

        let request = link.update_status().await;
        assert_eq!(handle.connect_attempts(), 2);
        assert_eq!(request.state(), RequestState::Running);
        assert_eq!(handle.written_lines(), vec!["999 device status"]);
    }

    #[tokio::test]
    async fn test_reconnect_failure_fails_request_without_writing() {
        let (link, handle) = link();
        handle.refuse_connections(true);

        let request = link.update_status().await;
        assert!(matches!(
            request.state(),
            RequestState::Failed(TccError::Connection(_))
        ));
        assert_eq!(handle.connect_attempts(), 1);
        assert_eq!(handle.bytes_written(), 0);
        assert_eq!(link.link_state(), LinkState::Disconnected);
    }

    #[tokio::test]
    async fn test_write_failure_retried_once() {
        let (link, handle) = link();
        link.connect().await.unwrap();
        handle.fail_next_writes(1);

        let request = link.update_status().await;
        assert_eq!(request.state(), RequestState::Running);
        assert_eq!(handle.connect_attempts(), 2);
        assert_eq!(handle.written_lines(), vec!["999 device status"]);

        handle.fail_next_writes(2);
        let request = link.update_status().await;
        assert!(matches!(
            request.state(),
            RequestState::Failed(TccError::Connection(_))
        ));
        assert_eq!(handle.connect_attempts(), 3);
    }

    #[tokio::test]
    async fn test_new_request_supersedes_pending() {
        let (link, _handle) = link();
        link.connect().await.unwrap();

        let first = link.update_status().await;
        let second = link.update_status().await;
        assert_ne!(first.generation(), second.generation());
        assert_eq!(first.wait().await, Err(TccError::Superseded));

        link.handle_reply(STATUS_REPLY);
        assert!(second.wait().await.is_ok());
    }

    #[tokio::test]
    async fn test_status_times_out() {
        let settings = TccSettings {
            status_timeout_secs: 0.05,
            ..Default::default()
        };
        let (link, _handle) = link_with(settings);
        link.connect().await.unwrap();

        let request = link.update_status().await;
        assert_eq!(
            request.wait().await,
            Err(TccError::Timeout(Duration::from_secs_f64(0.05)))
        );
    }

    #[tokio::test]
    async fn test_late_reply_does_not_complete() {
        let settings = TccSettings {
            status_timeout_secs: 0.02,
            ..Default::default()
        };
        let (link, _handle) = link_with(settings);
        link.connect().await.unwrap();

        let request = link.update_status().await;
        tokio::time::sleep(Duration::from_millis(60)).await;
        link.handle_reply(STATUS_REPLY);

        assert!(matches!(
            request.state(),
            RequestState::Failed(TccError::Timeout(_))
        ));
        // The reply still updates the cached state.
        assert!(link.is_ok_to_offset());
    }

    #[tokio::test]
    async fn test_connection_loss_marks_disconnected() {
        let (link, handle) = link();
        link.connect().await.unwrap();
        handle.drop_connection();

        for _ in 0..100 {
            if link.link_state() == LinkState::Disconnected {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(link.link_state(), LinkState::Disconnected);
    }

    #[tokio::test]
    async fn test_disconnect() {
        let (link, handle) = link();
        link.connect().await.unwrap();
        link.disconnect().await;
        assert_eq!(link.link_state(), LinkState::Disconnected);
        assert!(!handle.is_connected());
    }
}
