//! Best-effort scheduling hints for worker threads.

use crate::config::SchedPolicy;
use crate::{Error, Result};
use thread_priority::{ThreadPriority, ThreadPriorityValue};

/// Priority (0-99) plus policy, applied on the worker's own thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriorityHint {
    pub priority: u8,
    pub policy: SchedPolicy,
}

impl PriorityHint {
    pub fn new(priority: u8, policy: SchedPolicy) -> Self {
        Self {
            priority: priority.min(99),
            policy,
        }
    }

    /// Nothing to change from the OS default.
    pub fn is_default(&self) -> bool {
        self.priority == 0 && self.policy == SchedPolicy::Normal
    }
}

/// Apply `hint` to the calling thread.
pub(crate) fn apply_to_current(hint: PriorityHint) -> Result<()> {
    if hint.is_default() {
        return Ok(());
    }

    let value = ThreadPriorityValue::try_from(hint.priority)
        .map_err(|e| Error::Priority(format!("{e:?}")))?;
    let priority = ThreadPriority::Crossplatform(value);

    #[cfg(unix)]
    {
        use thread_priority::unix::{
            set_thread_priority_and_policy, thread_native_id, NormalThreadSchedulePolicy,
            RealtimeThreadSchedulePolicy, ThreadSchedulePolicy,
        };

        let policy = match hint.policy {
            SchedPolicy::Normal => ThreadSchedulePolicy::Normal(NormalThreadSchedulePolicy::Other),
            SchedPolicy::Fifo => ThreadSchedulePolicy::Realtime(RealtimeThreadSchedulePolicy::Fifo),
            SchedPolicy::RoundRobin => {
                ThreadSchedulePolicy::Realtime(RealtimeThreadSchedulePolicy::RoundRobin)
            }
        };

        set_thread_priority_and_policy(thread_native_id(), priority, policy)
            .map_err(|e| Error::Priority(format!("{e:?}")))
    }

    #[cfg(not(unix))]
    {
        thread_priority::set_current_thread_priority(priority)
            .map_err(|e| Error::Priority(format!("{e:?}")))
    }
}
