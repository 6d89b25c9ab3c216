//! Hierarchical state machine: transfer chains, loop detection, composite
//! descent, time-limited states.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use agentry::agent::State;
use agentry::prelude::*;
use agentry::util::{AgentId, CoopId};

type SharedLog = Arc<Mutex<String>>;

#[derive(Debug)]
struct Probe(i32);

/// Three states chained with transfer_to_state; the message is consumed in
/// the last one. Entry/exit markers must interleave exactly.
#[test]
fn transfer_to_state_chain() {
    struct Wanderer {
        log: SharedLog,
        st_one: Option<State>,
    }

    impl Wanderer {
        fn append(&self, text: &str) {
            self.log.lock().push_str(text);
        }
    }

    impl Agent for Wanderer {
        fn so_define_agent(&mut self, ctx: &mut AgentContext<'_>) -> AgentResult {
            let one = ctx.so_define_state("one");
            let two = ctx.so_define_state("two");
            let three = ctx.so_define_state("three");
            self.st_one = Some(one);

            ctx.so_state(&one)
                .on_enter(|this: &mut Wanderer| this.append("+1"))
                .on_exit(|this: &mut Wanderer| this.append("-1"))
                .transfer_to_state::<Probe>(&two)?;

            ctx.so_state(&two)
                .on_enter(|this: &mut Wanderer| this.append("+2"))
                .on_exit(|this: &mut Wanderer| this.append("-2"))
                .transfer_to_state::<Probe>(&three)?;

            ctx.so_state(&three)
                .on_enter(|this: &mut Wanderer| this.append("+3"))
                .on_exit(|this: &mut Wanderer| this.append("-3"))
                .event_ctx(|this: &mut Wanderer, ctx, probe: &Probe| {
                    this.append(&format!("{{m:{}}}", probe.0));
                    let default = ctx.so_default_state();
                    ctx.so_change_state(&default)?;
                    ctx.so_deregister_agent_coop_normally();
                    Ok::<(), AgentError>(())
                })?;
            Ok(())
        }

        fn so_evt_start(&mut self, ctx: &mut AgentContext<'_>) -> AgentResult {
            let one = self.st_one.unwrap();
            ctx.so_change_state(&one)?;
            send(&ctx.so_direct_mbox(), Probe(42))?;
            Ok(())
        }
    }

    let log: SharedLog = Arc::new(Mutex::new(String::new()));
    let observed = Arc::clone(&log);

    Environment::launch(move |env| {
        let mut coop = env.make_coop();
        coop.add_agent(Wanderer { log, st_one: None });
        env.register_coop(coop)?;
        Ok(())
    })
    .unwrap();

    assert_eq!(observed.lock().as_str(), "+1-1+2-2+3{m:42}-3");
}

/// A transfer cycle is detected instead of recursing; the error reaches
/// the error logger and the configured reaction deregisters the coop.
#[test]
fn transfer_to_state_loop_detected() {
    struct Looper {
        st_a: Option<State>,
    }

    impl Agent for Looper {
        fn so_define_agent(&mut self, ctx: &mut AgentContext<'_>) -> AgentResult {
            let a = ctx.so_define_state("a");
            let b = ctx.so_define_state("b");
            self.st_a = Some(a);

            ctx.so_state(&a).transfer_to_state::<Probe>(&b)?;
            ctx.so_state(&b).transfer_to_state::<Probe>(&a)?;
            Ok(())
        }

        fn so_evt_start(&mut self, ctx: &mut AgentContext<'_>) -> AgentResult {
            let a = self.st_a.unwrap();
            ctx.so_change_state(&a)?;
            send(&ctx.so_direct_mbox(), Probe(1))?;
            Ok(())
        }
    }

    struct Recorder {
        seen: Arc<Mutex<Vec<String>>>,
    }

    impl agentry::environment::ErrorLogger for Recorder {
        fn log(
            &self,
            error: &(dyn std::error::Error + 'static),
            _agent: AgentId,
            _coop: Option<CoopId>,
        ) {
            self.seen.lock().push(error.to_string());
        }
    }

    let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let observed = Arc::clone(&seen);

    let params = EnvParams::default().error_logger(Arc::new(Recorder { seen }));
    Environment::launch_with_params(params, |env| {
        let mut coop = env.make_coop();
        coop.set_exception_reaction(ExceptionReaction::DeregCoopOnError);
        coop.add_agent(Looper { st_a: None });
        env.register_coop(coop)?;
        Ok(())
    })
    .unwrap();

    let seen = observed.lock();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].contains("transfer_to_state loop"));
}

/// Entering a composite state descends along initial substates; a
/// composite without one refuses the transition.
#[test]
fn composite_state_descent() {
    struct Nested {
        outer: Option<State>,
        inner: Option<State>,
        bare: Option<State>,
        log: SharedLog,
    }

    impl Agent for Nested {
        fn so_define_agent(&mut self, ctx: &mut AgentContext<'_>) -> AgentResult {
            let outer = ctx.so_define_state("outer");
            let inner = ctx.so_define_initial_substate("inner", &outer);
            let bare = ctx.so_define_state("bare");
            let _orphan = ctx.so_define_substate("orphan", &bare);
            self.outer = Some(outer);
            self.inner = Some(inner);
            self.bare = Some(bare);

            ctx.so_state(&outer)
                .on_enter(|this: &mut Nested| this.log.lock().push('O'));
            ctx.so_state(&inner)
                .on_enter(|this: &mut Nested| this.log.lock().push('I'));
            Ok(())
        }

        fn so_evt_start(&mut self, ctx: &mut AgentContext<'_>) -> AgentResult {
            let outer = self.outer.unwrap();
            ctx.so_change_state(&outer)?;

            // `bare` has substates but no initial one: the transition is
            // rejected up front.
            let bare = self.bare.unwrap();
            let refused = ctx.so_change_state(&bare);
            assert!(matches!(
                refused,
                Err(RuntimeError::InitialSubstateMissing { .. })
            ));

            ctx.so_deregister_agent_coop_normally();
            Ok(())
        }
    }

    let log: SharedLog = Arc::new(Mutex::new(String::new()));
    let observed = Arc::clone(&log);

    Environment::launch(move |env| {
        let mut coop = env.make_coop();
        coop.add_agent(Nested {
            outer: None,
            inner: None,
            bare: None,
            log,
        });
        env.register_coop(coop)?;
        Ok(())
    })
    .unwrap();

    // Outer entered, then descent into the initial substate.
    assert_eq!(observed.lock().as_str(), "OI");
}

/// A time-limited state transitions on its own when nothing else does.
#[test]
fn time_limited_state_fires() {
    struct Waiter {
        st_wait: Option<State>,
        mbox: Option<MboxRef>,
        log: SharedLog,
    }

    struct Landed;
    impl Signal for Landed {}

    impl Agent for Waiter {
        fn so_define_agent(&mut self, ctx: &mut AgentContext<'_>) -> AgentResult {
            let wait = ctx.so_define_state("wait");
            let done = ctx.so_define_state("done");
            self.st_wait = Some(wait);
            self.mbox = Some(ctx.so_direct_mbox());

            ctx.so_state(&wait)
                .on_enter(|this: &mut Waiter| this.log.lock().push('W'))
                .time_limit(Duration::from_millis(40), &done);

            ctx.so_state(&done).on_enter(|this: &mut Waiter| {
                this.log.lock().push('D');
                if let Some(mbox) = &this.mbox {
                    let _ = send_signal::<Landed>(mbox);
                }
            });

            ctx.so_subscribe_self()
                .in_state(&done)
                .event_signal_ctx::<Landed, _, _, _>(|_this: &mut Waiter, ctx| {
                    ctx.so_deregister_agent_coop_normally();
                })?;
            Ok(())
        }

        fn so_evt_start(&mut self, ctx: &mut AgentContext<'_>) -> AgentResult {
            let wait = self.st_wait.unwrap();
            ctx.so_change_state(&wait)?;
            Ok(())
        }
    }

    let log: SharedLog = Arc::new(Mutex::new(String::new()));
    let observed = Arc::clone(&log);

    Environment::launch(move |env| {
        let mut coop = env.make_coop();
        coop.add_agent(Waiter {
            st_wait: None,
            mbox: None,
            log,
        });
        env.register_coop(coop)?;
        Ok(())
    })
    .unwrap();

    assert_eq!(observed.lock().as_str(), "WD");
}

/// `just_switch_to` changes state without re-dispatching; `suppress`
/// swallows the message entirely.
#[test]
fn just_switch_and_suppress() {
    #[derive(Debug)]
    struct Step;
    #[derive(Debug)]
    struct Noise;

    struct Switcher {
        st_idle: Option<State>,
        log: SharedLog,
    }

    struct Done;
    impl Signal for Done {}

    impl Agent for Switcher {
        fn so_define_agent(&mut self, ctx: &mut AgentContext<'_>) -> AgentResult {
            let idle = ctx.so_define_state("idle");
            let busy = ctx.so_define_state("busy");
            self.st_idle = Some(idle);

            ctx.so_state(&idle)
                .just_switch_to::<Step>(&busy)?
                .suppress::<Noise>()?;

            ctx.so_state(&busy)
                .on_enter(|this: &mut Switcher| this.log.lock().push('B'))
                // A Step that reached `busy` would be a dispatch bug.
                .event(|this: &mut Switcher, _step: &Step| {
                    this.log.lock().push('X');
                })?;

            // Noise has a default-state handler: reaching it from `idle`
            // would mean suppress failed.
            ctx.so_subscribe_self()
                .event(|this: &mut Switcher, _noise: &Noise| {
                    this.log.lock().push('N');
                })?;

            ctx.so_subscribe_self()
                .in_state(&idle)
                .in_state(&busy)
                .event_signal_ctx::<Done, _, _, _>(|_this: &mut Switcher, ctx| {
                    ctx.so_deregister_agent_coop_normally();
                })?;
            Ok(())
        }

        fn so_evt_start(&mut self, ctx: &mut AgentContext<'_>) -> AgentResult {
            let idle = self.st_idle.unwrap();
            ctx.so_change_state(&idle)?;
            let mbox = ctx.so_direct_mbox();
            send(&mbox, Noise)?;
            send(&mbox, Step)?;
            send_signal::<Done>(&mbox)?;
            Ok(())
        }
    }

    let log: SharedLog = Arc::new(Mutex::new(String::new()));
    let observed = Arc::clone(&log);

    Environment::launch(move |env| {
        let mut coop = env.make_coop();
        coop.add_agent(Switcher { st_idle: None, log });
        env.register_coop(coop)?;
        Ok(())
    })
    .unwrap();

    // Noise suppressed in idle, Step switched to busy without re-dispatch.
    assert_eq!(observed.lock().as_str(), "B");
}
