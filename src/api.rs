//! `avctl` API handle
//!
//! [`AvClient`] turns application and codec requests into queued events. Every call posts exactly
//! one event; the outcome is reported later through the application callback. The handle only
//! borrows the queue, so any number of clients can share one engine.
//!
//! # Usage
//!
//! ```rust,ignore
//! use avctl::{AvChannel, AvClient, Features};
//!
//! let client = AvClient::new(&QUEUE);
//! client.enable(Features(Features::RCTG | Features::RCCT), 0).await;
//! client.register(AvChannel::Audio, 1, &[sbc_source]).await?;
//! // wait for AvEvent::Registered, then
//! client.open(handle, peer, avctl::constants::uuid::AUDIO_SOURCE, true, 0).await;
//! ```

use crate::avrc::{MetaResponse, RcData};
use crate::constants::MAX_DISC_SEPS;
use crate::engine::EventQueue;
use crate::event::{
    Event, LocalSepConfig, MainEvent, OpenRequest, ReconfigRequest, SecurityData, StopRequest,
    StreamEvent, SwitchResult,
};
use crate::{AvChannel, AvError, AvHandle, BluetoothAddress, Features};
use embassy_sync::blocking_mutex::raw::RawMutex;
use heapless::Vec;

/// Request handle borrowing the engine's event queue
#[derive(Clone, Copy)]
pub struct AvClient<'q, M: RawMutex> {
    queue: &'q EventQueue<M>,
}

impl<'q, M: RawMutex> AvClient<'q, M> {
    /// Create a client posting into `queue`
    #[must_use]
    pub const fn new(queue: &'q EventQueue<M>) -> Self {
        Self { queue }
    }

    /// Post an event, waiting for room in the queue
    pub async fn send(&self, event: Event) {
        self.queue.send(event).await;
    }

    /// Post an event without waiting.
    ///
    /// # Errors
    /// Returns `AvError::QueueFull` when the queue has no room.
    pub fn try_send(&self, event: Event) -> Result<(), AvError> {
        self.queue.try_send(event).map_err(|_| AvError::QueueFull)
    }

    async fn main(&self, event: MainEvent) {
        self.send(Event::Main(event)).await;
    }

    async fn stream(&self, handle: AvHandle, event: StreamEvent) {
        self.send(Event::stream(handle, event)).await;
    }

    /// Enable the engine with `features`
    pub async fn enable(&self, features: Features, sec_mask: u8) {
        self.main(MainEvent::Enable { features, sec_mask }).await;
    }

    /// Close every connection, deregister every stream and disable the engine
    pub async fn disable(&self) {
        self.main(MainEvent::Disable).await;
    }

    /// Register a stream with up to two local endpoints.
    ///
    /// # Errors
    /// Returns `AvError::InvalidParameter` for an empty or oversized endpoint list.
    pub async fn register(&self, channel: AvChannel, app_id: u8, seps: &[LocalSepConfig]) -> Result<(), AvError> {
        if seps.is_empty() {
            return Err(AvError::InvalidParameter);
        }
        let seps = Vec::from_slice(seps).map_err(|()| AvError::InvalidParameter)?;
        self.main(MainEvent::Register {
            channel,
            app_id,
            seps,
        })
        .await;
        Ok(())
    }

    /// Deregister a stream
    pub async fn deregister(&self, handle: AvHandle) {
        self.main(MainEvent::Deregister(handle)).await;
    }

    /// Open a stream to `peer`; `uuid` is the local service class
    pub async fn open(&self, handle: AvHandle, peer: BluetoothAddress, uuid: u16, use_rc: bool, sec_mask: u8) {
        let req = OpenRequest {
            peer,
            uuid,
            use_rc,
            sec_mask,
            switch_res: SwitchResult::None,
        };
        self.stream(handle, StreamEvent::ApiOpen(req)).await;
    }

    /// Close a stream
    pub async fn close(&self, handle: AvHandle) {
        self.stream(handle, StreamEvent::ApiClose).await;
    }

    /// Start streaming
    pub async fn start(&self, handle: AvHandle) {
        self.stream(handle, StreamEvent::ApiStart).await;
    }

    /// Stop local media, suspending the stream when `suspend` is set
    pub async fn stop(&self, handle: AvHandle, suspend: bool, flush: bool) {
        self.stream(handle, StreamEvent::ApiStop(StopRequest { suspend, flush }))
            .await;
    }

    /// Reconfigure a stream
    pub async fn reconfig(&self, handle: AvHandle, req: ReconfigRequest) {
        self.stream(handle, StreamEvent::ApiReconfig(req)).await;
    }

    /// Send a content protection request.
    ///
    /// # Errors
    /// Returns `AvError::InvalidParameter` when `data` does not fit one event.
    pub async fn protect_req(&self, handle: AvHandle, data: &[u8]) -> Result<(), AvError> {
        let data = SecurityData::from_slice(data).map_err(|()| AvError::InvalidParameter)?;
        self.stream(handle, StreamEvent::ApiProtectReq(data)).await;
        Ok(())
    }

    /// Answer a content protection request.
    ///
    /// # Errors
    /// Returns `AvError::InvalidParameter` when `data` does not fit one event.
    pub async fn protect_rsp(&self, handle: AvHandle, err: u8, data: &[u8]) -> Result<(), AvError> {
        let data = SecurityData::from_slice(data).map_err(|()| AvError::InvalidParameter)?;
        self.stream(handle, StreamEvent::ApiProtectRsp { err, data }).await;
        Ok(())
    }

    /// Bring up AVRCP for an open stream
    pub async fn rc_open(&self, handle: AvHandle) {
        self.stream(handle, StreamEvent::ApiRcOpen).await;
    }

    /// Close an AVRCP connection
    pub async fn rc_close(&self, rc_handle: u8) {
        self.main(MainEvent::RcClose(rc_handle)).await;
    }

    /// Send a pass-through command
    pub async fn remote_cmd(&self, rc_handle: u8, label: u8, op_id: u8, pressed: bool) {
        self.main(MainEvent::RemoteCmd {
            rc_handle,
            label,
            op_id,
            pressed,
        })
        .await;
    }

    /// Send a vendor-dependent command.
    ///
    /// # Errors
    /// Returns `AvError::InvalidParameter` when `data` does not fit one event.
    pub async fn vendor_cmd(&self, rc_handle: u8, label: u8, ctype: u8, data: &[u8]) -> Result<(), AvError> {
        let data = RcData::from_slice(data).map_err(|()| AvError::InvalidParameter)?;
        self.main(MainEvent::VendorCmd {
            rc_handle,
            label,
            ctype,
            data,
        })
        .await;
        Ok(())
    }

    /// Send a vendor-dependent response.
    ///
    /// # Errors
    /// Returns `AvError::InvalidParameter` when `data` does not fit one event.
    pub async fn vendor_rsp(&self, rc_handle: u8, label: u8, rsp_code: u8, data: &[u8]) -> Result<(), AvError> {
        let data = RcData::from_slice(data).map_err(|()| AvError::InvalidParameter)?;
        self.main(MainEvent::VendorRsp {
            rc_handle,
            label,
            rsp_code,
            data,
        })
        .await;
        Ok(())
    }

    /// Send a metadata response (`is_rsp`) or command
    pub async fn meta_rsp(&self, rc_handle: u8, label: u8, is_rsp: bool, code: u8, response: MetaResponse) {
        self.main(MainEvent::MetaRsp {
            rc_handle,
            label,
            is_rsp,
            code,
            response,
        })
        .await;
    }

    /// Drop the signalling channel to `peer`
    pub async fn disconnect(&self, peer: BluetoothAddress) {
        self.main(MainEvent::Disconnect(peer)).await;
    }

    /// Set the local delay value reported to the peer
    pub async fn set_delay_value(&self, handle: AvHandle, delay: u16) {
        self.stream(handle, StreamEvent::ApiSetDelayValue(delay)).await;
    }

    /// Codec accepted a peer configuration; `seids` are the peer endpoints to probe afterwards.
    ///
    /// # Errors
    /// Returns `AvError::InvalidParameter` when `seids` is too long.
    pub async fn setconfig_ok(
        &self,
        handle: AvHandle,
        avdt_handle: u8,
        seids: &[u8],
        recfg_needed: bool,
    ) -> Result<(), AvError> {
        let seids: Vec<u8, MAX_DISC_SEPS> = Vec::from_slice(seids).map_err(|()| AvError::InvalidParameter)?;
        let event = StreamEvent::CiSetconfigOk {
            num_seps: seids.len() as u8,
            seids,
            recfg_needed,
            avdt_handle,
        };
        self.stream(handle, event).await;
        Ok(())
    }

    /// Codec rejected a peer configuration
    pub async fn setconfig_fail(&self, handle: AvHandle, avdt_handle: u8, err: u8, category: u8) {
        let event = StreamEvent::CiSetconfigFail {
            err,
            category,
            avdt_handle,
        };
        self.stream(handle, event).await;
    }

    /// Codec has media ready for a started source stream
    pub async fn data_ready(&self, handle: AvHandle) {
        self.stream(handle, StreamEvent::SrcDataReady).await;
    }
}
