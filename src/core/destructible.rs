//! # Two-phase destroy state machine.
//!
//! [`Destructible`] composes an [`Emitter`] with the
//! `Active → Destroying → Destroyed` machine every instance runs through
//! exactly once.
//!
//! ## Event flow
//! ```text
//! destroy(pre, post)
//!   ├─► already destroying?  → warn, return Ok   (gridlock breaker)
//!   ├─► already destroyed?   → Err(AlreadyDestroyed)
//!   ├─► destroying = true
//!   ├─► emit BEFORE_DESTROY                       (once, ever)
//!   ├─► arm watchdog (grace, observational only)
//!   ├─► await pre()          ── error propagates, watchdog disarmed
//!   ├─► destroyed = true
//!   ├─► emit DESTROY                              (once, ever, before
//!   ├─► remove all listeners                       listener removal)
//!   ├─► await post()
//!   ├─► listeners re-added?  → Err(ListenersAfterTeardown)
//!   └─► destroying = false                        (sub-phase cleared)
//! ```
//!
//! ## Rules
//! - The gridlock breaker is the **only** deadlock-avoidance mechanism:
//!   two instances whose pre-handlers await each other's `destroy()` both
//!   terminate because the inner call observes `destroying` and returns.
//! - The watchdog never cancels or forces anything; it emits
//!   `DESTROY_STACK_TIMED_OUT` and a warning if `pre` outlives the grace.
//! - On a pre/post error the machine stays destroying-but-not-complete;
//!   there is no retry contract.

use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::cleanup::TeardownRef;
use crate::error::LifecycleError;
use crate::events::{Emitter, Event, topic};
use crate::log::LogContext;

#[derive(Default)]
struct DestroyState {
    destroying: bool,
    destroyed: bool,
}

enum Admission {
    Proceed,
    AlreadyDestroying,
    AlreadyDestroyed,
}

/// Emitter plus the destroy state machine; the base every instance embeds.
pub(crate) struct Destructible {
    emitter: Emitter,
    state: Mutex<DestroyState>,
    grace: Option<Duration>,
    log: LogContext,
}

impl Destructible {
    pub fn new(emitter: Emitter, grace: Option<Duration>, log: LogContext) -> Self {
        Self {
            emitter,
            state: Mutex::new(DestroyState::default()),
            grace,
            log,
        }
    }

    pub fn emitter(&self) -> &Emitter {
        &self.emitter
    }

    pub fn is_destroying(&self) -> bool {
        self.state.lock().destroying
    }

    pub fn is_destroyed(&self) -> bool {
        self.state.lock().destroyed
    }

    fn admit(&self) -> Admission {
        let mut st = self.state.lock();
        if st.destroying {
            Admission::AlreadyDestroying
        } else if st.destroyed {
            Admission::AlreadyDestroyed
        } else {
            st.destroying = true;
            Admission::Proceed
        }
    }

    /// Runs the full destroy protocol. `pre` runs between `BEFORE_DESTROY`
    /// and the destroyed transition; `post` runs after listener removal.
    pub async fn destroy(
        &self,
        pre: Option<TeardownRef>,
        post: Option<TeardownRef>,
    ) -> Result<(), LifecycleError> {
        match self.admit() {
            Admission::AlreadyDestroying => {
                self.log
                    .warn("destroy() ignored: already destroying (gridlock breaker)");
                return Ok(());
            }
            Admission::AlreadyDestroyed => return Err(LifecycleError::AlreadyDestroyed),
            Admission::Proceed => {}
        }

        self.emitter
            .emit(&Event::new(topic::BEFORE_DESTROY).with_source(self.log.id.clone()));

        // Armed for the duration of the pre-handler only; the drop guard
        // disarms it on every exit path, including errors.
        let watchdog = self.grace.map(|grace| {
            let token = CancellationToken::new();
            let armed = token.clone();
            let emitter = self.emitter.clone();
            let log = self.log.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = armed.cancelled() => {}
                    _ = tokio::time::sleep(grace) => {
                        log.warn(&format!(
                            "destroy pre-handler still running after {grace:?}"
                        ));
                        emitter.emit(
                            &Event::new(topic::DESTROY_STACK_TIMED_OUT)
                                .with_source(log.id.clone())
                                .with_reason(format!(
                                    "pre-handler still running after {grace:?}"
                                )),
                        );
                    }
                }
            });
            token.drop_guard()
        });

        if let Some(pre) = pre {
            pre.run().await?;
        }
        drop(watchdog);

        self.state.lock().destroyed = true;
        // Before listener removal, so subscribers observe the transition.
        self.emitter
            .emit(&Event::new(topic::DESTROY).with_source(self.log.id.clone()));
        self.emitter.remove_all();

        if let Some(post) = post {
            post.run().await?;
        }

        let leftover = self.emitter.total_listeners();
        if leftover > 0 {
            self.log.error(&format!(
                "{leftover} listener(s) registered during post-destroy phase"
            ));
            return Err(LifecycleError::ListenersAfterTeardown { count: leftover });
        }

        self.state.lock().destroying = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cleanup::TeardownFn;
    use crate::error::TeardownError;
    use crate::events::handler;
    use crate::log;
    use crate::log::LogLevel;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn destructible(grace: Option<Duration>) -> Arc<Destructible> {
        let ctx = LogContext::new("Test".into(), "00000000".into(), log::new_cell(LogLevel::Off));
        Arc::new(Destructible::new(Emitter::new(), grace, ctx))
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_full_ordering_of_destroy_protocol() {
        let d = destructible(None);
        let trace = Arc::new(parking_lot::Mutex::new(Vec::new()));

        for name in [topic::BEFORE_DESTROY, topic::DESTROY] {
            let trace = trace.clone();
            d.emitter().on(
                name,
                handler(move |ev| trace.lock().push(ev.name.to_string())),
            );
        }
        let pre = {
            let trace = trace.clone();
            TeardownFn::arc("pre", move || {
                let trace = trace.clone();
                async move {
                    trace.lock().push("pre".into());
                    Ok(())
                }
            })
        };
        let post = {
            let trace = trace.clone();
            let d2 = d.clone();
            TeardownFn::arc("post", move || {
                let trace = trace.clone();
                let d2 = d2.clone();
                async move {
                    // Listeners are already gone by the post phase.
                    assert_eq!(d2.emitter().total_listeners(), 0);
                    trace.lock().push("post".into());
                    Ok(())
                }
            })
        };

        d.destroy(Some(pre), Some(post)).await.unwrap();
        assert_eq!(
            *trace.lock(),
            vec![
                topic::BEFORE_DESTROY.to_string(),
                "pre".into(),
                topic::DESTROY.into(),
                "post".into()
            ]
        );
        assert!(d.is_destroyed());
        assert!(!d.is_destroying());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_destroyed_flag_visible_inside_destroy_listener() {
        let d = destructible(None);
        let observed = Arc::new(AtomicUsize::new(0));
        let o = observed.clone();
        let d2 = d.clone();
        d.emitter().on(
            topic::DESTROY,
            handler(move |_| {
                if d2.is_destroyed() {
                    o.fetch_add(1, Ordering::SeqCst);
                }
            }),
        );
        d.destroy(None, None).await.unwrap();
        assert_eq!(observed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_reentrant_destroy_is_noop_and_runs_pre_once() {
        let d = destructible(None);
        let runs = Arc::new(AtomicUsize::new(0));
        let pre = {
            let runs = runs.clone();
            TeardownFn::arc("slow-pre", move || {
                let runs = runs.clone();
                async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok(())
                }
            })
        };

        let d2 = d.clone();
        let first = tokio::spawn(async move { d2.destroy(Some(pre), None).await });
        tokio::time::sleep(Duration::from_millis(10)).await;

        // Second call lands mid-pre: logged no-op, resolves immediately.
        assert!(d.is_destroying());
        d.destroy(None, None).await.unwrap();
        assert!(!d.is_destroyed());

        first.await.unwrap().unwrap();
        assert!(d.is_destroyed());
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_destroy_after_completion_is_an_error() {
        let d = destructible(None);
        d.destroy(None, None).await.unwrap();
        let err = d.destroy(None, None).await.unwrap_err();
        assert_eq!(err.as_label(), "already_destroyed");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_failing_pre_leaves_machine_destroying() {
        let d = destructible(None);
        let err = d
            .destroy(
                Some(TeardownFn::arc("boom", || async {
                    Err(TeardownError::failed("boom"))
                })),
                None,
            )
            .await
            .unwrap_err();
        assert_eq!(err.as_label(), "teardown_failed");
        assert!(d.is_destroying());
        assert!(!d.is_destroyed());
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_watchdog_emits_timed_out_but_destroy_completes() {
        let d = destructible(Some(Duration::from_millis(100)));
        let warned = Arc::new(AtomicUsize::new(0));
        let w = warned.clone();
        d.emitter().on(
            topic::DESTROY_STACK_TIMED_OUT,
            handler(move |_| {
                w.fetch_add(1, Ordering::SeqCst);
            }),
        );

        let pre = TeardownFn::arc("very-slow", || async {
            tokio::time::sleep(Duration::from_millis(300)).await;
            Ok(())
        });
        d.destroy(Some(pre), None).await.unwrap();
        assert_eq!(warned.load(Ordering::SeqCst), 1);
        assert!(d.is_destroyed());
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_fast_pre_never_trips_watchdog() {
        let d = destructible(Some(Duration::from_millis(100)));
        let warned = Arc::new(AtomicUsize::new(0));
        let w = warned.clone();
        d.emitter().on(
            topic::DESTROY_STACK_TIMED_OUT,
            handler(move |_| {
                w.fetch_add(1, Ordering::SeqCst);
            }),
        );

        d.destroy(None, None).await.unwrap();
        // Give a disarmed watchdog every chance to misfire.
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(warned.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_listener_added_in_post_phase_is_an_error() {
        let d = destructible(None);
        let post = {
            let d2 = d.clone();
            TeardownFn::arc("leaky-post", move || {
                let d2 = d2.clone();
                async move {
                    d2.emitter().on("oops", handler(|_| {}));
                    Ok(())
                }
            })
        };
        let err = d.destroy(None, Some(post)).await.unwrap_err();
        assert_eq!(err.as_label(), "listeners_after_teardown");
    }
}
