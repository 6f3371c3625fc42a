use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Idle,
    InProgress,
}

/// Guards one user action against duplicate concurrent runs. Each
/// component owns its own gate.
#[derive(Debug, Default)]
pub struct RequestGate {
    busy: AtomicBool,
}

impl RequestGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> RequestState {
        if self.busy.load(Ordering::Acquire) {
            RequestState::InProgress
        } else {
            RequestState::Idle
        }
    }

    /// `None` while another request holds the gate.
    pub fn try_begin(&self) -> Option<RequestGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RequestGuard { gate: self })
    }
}

/// Back to idle on drop, including early returns and panics.
#[derive(Debug)]
pub struct RequestGuard<'a> {
    gate: &'a RequestGate,
}

impl Drop for RequestGuard<'_> {
    fn drop(&mut self) {
        self.gate.busy.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn second_begin_is_refused_until_guard_drops() {
        let gate = RequestGate::new();
        assert_eq!(gate.state(), RequestState::Idle);

        let guard = gate.try_begin().expect("first");
        assert_eq!(gate.state(), RequestState::InProgress);
        assert!(gate.try_begin().is_none());

        drop(guard);
        assert_eq!(gate.state(), RequestState::Idle);
        assert!(gate.try_begin().is_some());
    }

    #[test]
    fn gates_are_independent() {
        let share_a = RequestGate::new();
        let share_b = RequestGate::new();
        let _held = share_a.try_begin().expect("a");
        assert!(share_b.try_begin().is_some());
    }

    #[tokio::test]
    async fn only_one_of_many_concurrent_callers_runs() {
        let gate = Arc::new(RequestGate::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let gate = gate.clone();
            handles.push(tokio::spawn(async move {
                match gate.try_begin() {
                    Some(_guard) => {
                        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                        true
                    }
                    None => false,
                }
            }));
        }
        let mut ran = 0;
        for handle in handles {
            if handle.await.expect("join") {
                ran += 1;
            }
        }
        assert_eq!(ran, 1);
        assert_eq!(gate.state(), RequestState::Idle);
    }
}
