//! One-shot timers kept by the shell. Used for the search debounce.

use crux_core::capability::{Capability, CapabilityContext, Operation};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum TimerOperation {
    Start { id: u64, millis: u64 },
    /// The shell drops timer `id` if it has not fired yet.
    Cancel { id: u64 },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TimerOutput {
    Elapsed { id: u64 },
    Cancelled { id: u64 },
}

impl Operation for TimerOperation {
    type Output = TimerOutput;
}

pub struct Timer<E> {
    context: CapabilityContext<TimerOperation, E>,
}

impl<Ev> Capability<Ev> for Timer<Ev> {
    type Operation = TimerOperation;
    type MappedSelf<MappedEv> = Timer<MappedEv>;

    fn map_event<F, NewEv>(&self, f: F) -> Self::MappedSelf<NewEv>
    where
        F: Fn(NewEv) -> Ev + Send + Sync + 'static,
        Ev: 'static,
        NewEv: 'static + Send,
    {
        Timer::new(self.context.map_event(f))
    }
}

impl<E> Timer<E>
where
    E: 'static,
{
    pub fn new(context: CapabilityContext<TimerOperation, E>) -> Self {
        Self { context }
    }

    pub fn start<F>(&self, id: u64, after: Duration, callback: F)
    where
        F: FnOnce(TimerOutput) -> E + Send + 'static,
    {
        let millis = u64::try_from(after.as_millis()).unwrap_or(u64::MAX);
        let context = self.context.clone();
        self.context.spawn(async move {
            let output = context
                .request_from_shell(TimerOperation::Start { id, millis })
                .await;
            context.update_app(callback(output));
        });
    }

    pub fn cancel(&self, id: u64) {
        let context = self.context.clone();
        self.context.spawn(async move {
            context.notify_shell(TimerOperation::Cancel { id }).await;
        });
    }
}
