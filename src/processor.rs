//! Event loop driving an [`AvEngine`].
//!
//! The engine is a plain state owner; these helpers pull events off its queue and dispatch them
//! one at a time. Timers, transport callbacks and [`AvClient`](crate::AvClient) calls all post into
//! the same queue, so every event is handled to completion before the next one starts.
//!
//! # Usage
//!
//! ```rust,ignore
//! use avctl::{AvEngine, EventQueue, processor};
//! use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
//!
//! static QUEUE: EventQueue<CriticalSectionRawMutex> = EventQueue::new();
//!
//! #[embassy_executor::task]
//! async fn av_task(platform: MyPlatform) {
//!     let mut engine = AvEngine::new(platform, &QUEUE);
//!     processor::run(&mut engine).await;
//! }
//! ```

use crate::engine::AvEngine;
use crate::platform::Platform;
use embassy_futures::select::{Either, select};
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::signal::Signal;

/// Dispatch every event already queued, including follow-ups posted while doing so.
///
/// Returns the number of events handled.
pub fn process_pending<P: Platform, M: RawMutex>(engine: &mut AvEngine<'_, P, M>) -> usize {
    let queue = engine.queue();
    let mut handled = 0;
    while let Ok(event) = queue.try_receive() {
        engine.dispatch(event);
        handled += 1;
    }
    if handled > 0 {
        trace!("[MAIN] processed {} events", handled);
    }
    handled
}

/// Process events forever
pub async fn run<P: Platform, M: RawMutex>(engine: &mut AvEngine<'_, P, M>) -> ! {
    let queue = engine.queue();
    info!("[MAIN] event loop running");
    loop {
        let event = queue.receive().await;
        engine.dispatch(event);
    }
}

/// Process events until `stop` is signalled.
///
/// Events still queued when the signal arrives are left for the next run.
pub async fn run_until<P: Platform, M: RawMutex>(engine: &mut AvEngine<'_, P, M>, stop: &Signal<M, ()>) {
    let queue = engine.queue();
    info!("[MAIN] event loop running until stopped");
    loop {
        match select(queue.receive(), stop.wait()).await {
            Either::First(event) => engine.dispatch(event),
            Either::Second(()) => {
                info!("[MAIN] event loop stopped");
                return;
            }
        }
    }
}
