//! In-memory collaborators for exercising the session and processor.

use super::{Channel, FeedbackSender, TargetHandle, VirtualBus};
use crate::device::{Feedback, SinkReport, TargetKind};
use crate::error::{RdpGamepadError, Result};
use crate::protocol::Packet;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Default)]
pub struct ChannelState {
    pub open: bool,
    pub fail_open: bool,
    pub fail_send: bool,
    /// Close the channel the next time `receive` runs dry.
    pub drop_after_drain: bool,
    /// Panic on the next `open` / `close`. Cleared once fired.
    pub panic_on_open: bool,
    pub panic_on_close: bool,
    pub open_attempts: u32,
    pub close_calls: u32,
    pub sent: Vec<Packet>,
    pub inbound: VecDeque<Packet>,
}

/// A channel whose state stays inspectable after it moves into a session.
#[derive(Clone, Default)]
pub struct MockChannel {
    state: Arc<Mutex<ChannelState>>,
}

impl MockChannel {
    pub fn state(&self) -> MutexGuard<'_, ChannelState> {
        self.state.lock().unwrap()
    }

    pub fn push(&self, packet: Packet) {
        self.state().inbound.push_back(packet);
    }

    pub fn take_sent(&self) -> Vec<Packet> {
        std::mem::take(&mut self.state().sent)
    }
}

impl Channel for MockChannel {
    fn open(&mut self) -> Result<()> {
        let mut s = self.state();
        s.open_attempts += 1;
        if std::mem::take(&mut s.panic_on_open) {
            drop(s);
            panic!("channel open blew up");
        }
        if s.fail_open {
            return Err(RdpGamepadError::Channel("open refused".into()));
        }
        s.open = true;
        Ok(())
    }

    fn close(&mut self) {
        let mut s = self.state();
        if std::mem::take(&mut s.panic_on_close) {
            drop(s);
            panic!("channel close blew up");
        }
        s.open = false;
        s.close_calls += 1;
    }

    fn is_open(&self) -> bool {
        self.state().open
    }

    fn send(&mut self, packet: &Packet) -> Result<()> {
        let mut s = self.state();
        if s.fail_send {
            return Err(RdpGamepadError::Channel("send refused".into()));
        }
        s.sent.push(*packet);
        Ok(())
    }

    fn receive(&mut self) -> Option<Packet> {
        let mut s = self.state();
        let next = s.inbound.pop_front();
        if next.is_none() && s.drop_after_drain {
            s.open = false;
            s.drop_after_drain = false;
        }
        next
    }
}

#[derive(Default)]
pub struct BusState {
    pub fail_plug_in: bool,
    pub plugged: u32,
    pub unplugged: u32,
    pub live: HashMap<TargetHandle, (TargetKind, FeedbackSender)>,
    pub reports: Vec<(TargetHandle, SinkReport)>,
}

/// Records everything pushed to it; feedback can be injected per target.
#[derive(Default)]
pub struct MockBus {
    next: AtomicU64,
    state: Mutex<BusState>,
}

impl MockBus {
    pub fn state(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap()
    }

    pub fn last_report(&self) -> Option<SinkReport> {
        self.state().reports.last().map(|(_, r)| *r)
    }

    pub fn report_count(&self) -> usize {
        self.state().reports.len()
    }

    pub fn live_count(&self) -> usize {
        self.state().live.len()
    }

    /// Deliver feedback to every live target, as the driver's callback would.
    pub fn notify(&self, feedback: Feedback) {
        for (_, sender) in self.state().live.values() {
            sender.send(feedback).unwrap();
        }
    }
}

impl VirtualBus for MockBus {
    fn plug_in(&self, kind: TargetKind, feedback: FeedbackSender) -> Result<TargetHandle> {
        let mut s = self.state();
        if s.fail_plug_in {
            return Err(RdpGamepadError::ViGEm("no free slots".into()));
        }
        let handle = TargetHandle(self.next.fetch_add(1, Ordering::SeqCst) + 1);
        s.plugged += 1;
        s.live.insert(handle, (kind, feedback));
        Ok(handle)
    }

    fn update(&self, handle: TargetHandle, report: &SinkReport) -> Result<()> {
        let mut s = self.state();
        match s.live.get(&handle) {
            Some((kind, _)) if *kind == report.kind() => {
                s.reports.push((handle, *report));
                Ok(())
            }
            Some(_) => Err(RdpGamepadError::ViGEm("report kind mismatch".into())),
            None => Err(RdpGamepadError::ViGEm(format!("unknown target {}", handle.0))),
        }
    }

    fn unplug(&self, handle: TargetHandle) -> Result<()> {
        let mut s = self.state();
        s.live
            .remove(&handle)
            .ok_or_else(|| RdpGamepadError::ViGEm(format!("unknown target {}", handle.0)))?;
        s.unplugged += 1;
        Ok(())
    }
}
