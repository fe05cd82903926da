//! Structured task group joining independent jobs into an index-aligned result.

use std::fmt;
use std::future::Future;
use std::str::FromStr;
use tokio::task::JoinSet;

/// What the group does with the remaining jobs once one fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum JoinPolicy {
    /// Abort every outstanding job and report the failure immediately.
    #[default]
    FailFast,
    /// Let the remaining jobs finish, then report the first failure observed.
    Drain,
}

impl FromStr for JoinPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "fail_fast" | "fail-fast" | "failfast" => Ok(Self::FailFast),
            "drain" => Ok(Self::Drain),
            other => Err(format!("unknown join policy '{other}'")),
        }
    }
}

impl fmt::Display for JoinPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::FailFast => "fail_fast",
            Self::Drain => "drain",
        })
    }
}

/// Why a group did not produce a full result vector.
#[derive(Debug)]
pub enum GroupFailure<E> {
    /// A job returned an error.
    Failed {
        /// Spawn index of the failing job.
        index: usize,
        /// Error returned by the job.
        error: E,
    },
    /// A job panicked or was cancelled outside the group.
    Panicked(String),
}

/// Set of spawned jobs whose outputs are returned in spawn order.
///
/// Dropping the group aborts anything still running.
pub struct TaskGroup<T, E> {
    policy: JoinPolicy,
    tasks: JoinSet<(usize, Result<T, E>)>,
    spawned: usize,
}

impl<T, E> TaskGroup<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// Create an empty group.
    pub fn new(policy: JoinPolicy) -> Self {
        Self {
            policy,
            tasks: JoinSet::new(),
            spawned: 0,
        }
    }

    /// Start `job` on the runtime; its output lands at the current spawn index.
    pub fn spawn<F>(&mut self, job: F) -> usize
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
    {
        let index = self.spawned;
        self.spawned += 1;
        self.tasks.spawn(async move { (index, job.await) });
        index
    }

    /// Number of jobs spawned so far.
    pub fn len(&self) -> usize {
        self.spawned
    }

    /// Whether no job has been spawned.
    pub fn is_empty(&self) -> bool {
        self.spawned == 0
    }

    /// Wait for every job and return their outputs in spawn order.
    pub async fn join(mut self) -> Result<Vec<T>, GroupFailure<E>> {
        let mut slots: Vec<Option<T>> = std::iter::repeat_with(|| None).take(self.spawned).collect();
        let mut failure = None;

        while let Some(joined) = self.tasks.join_next().await {
            let outcome = match joined {
                Ok((index, Ok(value))) => {
                    slots[index] = Some(value);
                    continue;
                }
                Ok((index, Err(error))) => GroupFailure::Failed { index, error },
                Err(join_error) if join_error.is_cancelled() && failure.is_some() => continue,
                Err(join_error) => GroupFailure::Panicked(join_error.to_string()),
            };

            if failure.is_none() {
                failure = Some(outcome);
            }
            if self.policy == JoinPolicy::FailFast {
                self.tasks.abort_all();
            }
        }

        if let Some(failure) = failure {
            return Err(failure);
        }
        slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.ok_or_else(|| GroupFailure::Panicked(format!("job {index} produced no output")))
            })
            .collect()
    }
}
