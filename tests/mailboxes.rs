//! Mailbox behavior: MPMC fan-out ordering, mutable-message refusal,
//! delivery filters, named registry idempotence, unique subscribers.

use std::sync::Arc;

use parking_lot::Mutex;

use agentry::mailbox::Mailbox;
use agentry::prelude::*;

type SharedLog = Arc<Mutex<String>>;

/// FIFO through an MPMC mailbox: three ints sent in order arrive in order.
#[test]
fn fifo_through_mpmc_mailbox() {
    struct Collector {
        mbox: MboxRef,
        log: SharedLog,
    }

    impl Agent for Collector {
        fn so_define_agent(&mut self, ctx: &mut AgentContext<'_>) -> AgentResult {
            let mbox = Arc::clone(&self.mbox);
            ctx.so_subscribe(&mbox)
                .event_ctx(|this: &mut Collector, ctx, value: &i32| {
                    let done = {
                        let mut log = this.log.lock();
                        log.push_str(&value.to_string());
                        log.len() == 3
                    };
                    if done {
                        ctx.so_deregister_agent_coop_normally();
                    }
                })?;
            Ok(())
        }
    }

    let log: SharedLog = Arc::new(Mutex::new(String::new()));
    let observed = Arc::clone(&log);

    Environment::launch(move |env| {
        let mbox = env.create_mbox();
        let mut coop = env.make_coop();
        coop.add_agent(Collector {
            mbox: Arc::clone(&mbox),
            log: Arc::clone(&log),
        });
        env.register_coop(coop)?;

        send(&mbox, 1i32)?;
        send(&mbox, 2i32)?;
        send(&mbox, 3i32)?;
        Ok(())
    })
    .unwrap();

    assert_eq!(observed.lock().as_str(), "123");
}

/// Subscribing to a mutable message on a plain MPMC mailbox must fail.
#[test]
fn mutable_subscription_on_mpmc_refused() {
    #[derive(Debug)]
    struct Payload(#[allow(dead_code)] u32);

    struct Prober {
        mbox: MboxRef,
        outcome: Arc<Mutex<Option<RuntimeError>>>,
    }

    impl Agent for Prober {
        fn so_define_agent(&mut self, ctx: &mut AgentContext<'_>) -> AgentResult {
            let mbox = Arc::clone(&self.mbox);
            let result = ctx
                .so_subscribe(&mbox)
                .event_mutable(|_this: &mut Prober, _payload: Payload| {});
            *self.outcome.lock() = result.err();
            Ok(())
        }

        fn so_evt_start(&mut self, ctx: &mut AgentContext<'_>) -> AgentResult {
            ctx.so_deregister_agent_coop_normally();
            Ok(())
        }
    }

    let outcome: Arc<Mutex<Option<RuntimeError>>> = Arc::new(Mutex::new(None));
    let observed = Arc::clone(&outcome);

    Environment::launch(move |env| {
        let mbox = env.create_mbox();
        let mut coop = env.make_coop();
        coop.add_agent(Prober { mbox, outcome });
        env.register_coop(coop)?;
        Ok(())
    })
    .unwrap();

    assert!(matches!(
        observed.lock().take(),
        Some(RuntimeError::SubscriptionToMutableFromMpmcMbox { .. })
    ));
}

/// A delivery filter skips rejected messages; dropping it restores flow.
#[test]
fn delivery_filter_set_and_unset() {
    #[derive(Debug)]
    struct Sample(i32);

    struct Picky {
        mbox: MboxRef,
        log: SharedLog,
    }

    impl Agent for Picky {
        fn so_define_agent(&mut self, ctx: &mut AgentContext<'_>) -> AgentResult {
            let mbox = Arc::clone(&self.mbox);
            ctx.so_set_delivery_filter(&mbox, |sample: &Sample| sample.0 % 2 == 0)?;
            ctx.so_subscribe(&mbox)
                .event_ctx(|this: &mut Picky, ctx, sample: &Sample| {
                    this.log.lock().push_str(&sample.0.to_string());
                    if sample.0 == 5 {
                        ctx.so_deregister_agent_coop_normally();
                    } else if sample.0 == 4 {
                        // Everything even has arrived: let odd values through.
                        let mbox = Arc::clone(&this.mbox);
                        ctx.so_drop_delivery_filter::<Sample>(&mbox);
                        let _ = send(&mbox, Sample(5));
                    }
                })?;
            Ok(())
        }
    }

    let log: SharedLog = Arc::new(Mutex::new(String::new()));
    let observed = Arc::clone(&log);

    Environment::launch(move |env| {
        let mbox = env.create_mbox();
        let mut coop = env.make_coop();
        coop.add_agent(Picky {
            mbox: Arc::clone(&mbox),
            log,
        });
        env.register_coop(coop)?;

        for value in 1..=4 {
            send(&mbox, Sample(value))?;
        }
        Ok(())
    })
    .unwrap();

    assert_eq!(observed.lock().as_str(), "245");
}

/// `introduce_named_mbox` is idempotent; the factory runs at most once.
#[test]
fn named_mbox_registry_idempotence() {
    Environment::launch(|env| {
        let first = env.create_named_mbox("orders")?;
        let second = env.create_named_mbox("orders")?;
        assert_eq!(first.id(), second.id());

        let mut factory_runs = 0;
        let custom = env.introduce_named_mbox("app", "billing", |data| {
            factory_runs += 1;
            let mbox = data.env.create_mbox();
            let _ = data.id;
            Ok(mbox)
        })?;
        let again = env.introduce_named_mbox("app", "billing", |_data| {
            unreachable!("factory must not run for a registered name");
        })?;
        assert_eq!(factory_runs, 1);
        assert_eq!(custom.id(), again.id());

        assert!(matches!(
            env.create_named_mbox(""),
            Err(RuntimeError::EmptyName)
        ));
        assert!(matches!(
            env.find_named_mbox("app", "missing"),
            Err(RuntimeError::MailboxNotFound { .. })
        ));
        Ok(())
    })
    .unwrap();
}

/// A failing factory leaves the registry consistent: the next caller's
/// factory runs and registers.
#[test]
fn named_mbox_factory_error_propagates() {
    Environment::launch(|env| {
        let failed = env.introduce_named_mbox("app", "flaky", |_data| {
            Err(RuntimeError::EmptyName)
        });
        assert!(failed.is_err());

        let recovered = env.introduce_named_mbox("app", "flaky", |data| Ok(data.env.create_mbox()));
        assert!(recovered.is_ok());
        Ok(())
    })
    .unwrap();
}

/// Unique-subscribers mailboxes allow one subscriber per type and accept
/// mutable messages for that subscriber.
#[test]
fn unique_subscribers_mailbox() {
    #[derive(Debug)]
    struct Job(String);

    struct Owner {
        mbox: MboxRef,
        log: SharedLog,
    }

    impl Agent for Owner {
        fn so_define_agent(&mut self, ctx: &mut AgentContext<'_>) -> AgentResult {
            let mbox = Arc::clone(&self.mbox);
            ctx.so_subscribe(&mbox)
                .event_mutable(|this: &mut Owner, job: Job| {
                    this.log.lock().push_str(&job.0);
                })?;
            ctx.so_subscribe(&mbox)
                .event_signal_ctx::<Done, _, _, _>(|_this: &mut Owner, ctx| {
                    ctx.so_deregister_agent_coop_normally();
                })?;
            Ok(())
        }
    }

    struct Intruder {
        mbox: MboxRef,
        outcome: Arc<Mutex<Option<RuntimeError>>>,
    }

    impl Agent for Intruder {
        fn so_define_agent(&mut self, ctx: &mut AgentContext<'_>) -> AgentResult {
            let mbox = Arc::clone(&self.mbox);
            let result = ctx
                .so_subscribe(&mbox)
                .event_mutable(|_this: &mut Intruder, _job: Job| {});
            *self.outcome.lock() = result.err();
            Ok(())
        }

        fn so_evt_start(&mut self, ctx: &mut AgentContext<'_>) -> AgentResult {
            ctx.so_deregister_agent_coop_normally();
            Ok(())
        }
    }

    struct Done;
    impl Signal for Done {}

    let log: SharedLog = Arc::new(Mutex::new(String::new()));
    let outcome: Arc<Mutex<Option<RuntimeError>>> = Arc::new(Mutex::new(None));
    let observed_log = Arc::clone(&log);
    let observed_outcome = Arc::clone(&outcome);

    Environment::launch(move |env| {
        let mbox = env.create_unique_subscribers_mbox();

        let mut owners = env.make_coop();
        owners.add_agent(Owner {
            mbox: Arc::clone(&mbox),
            log,
        });
        env.register_coop(owners)?;

        let mut intruders = env.make_coop();
        intruders.add_agent(Intruder {
            mbox: Arc::clone(&mbox),
            outcome,
        });
        env.register_coop(intruders)?;

        send_mutable(&mbox, Job("consumed".to_string()))?;
        send_signal::<Done>(&mbox)?;
        Ok(())
    })
    .unwrap();

    assert_eq!(observed_log.lock().as_str(), "consumed");
    assert!(matches!(
        observed_outcome.lock().take(),
        Some(RuntimeError::UniqueSubscriberClash { .. })
    ));
}

/// Deadletter handlers catch messages no state-bound handler consumed, and
/// subscribe/drop round-trips leave no trace.
#[test]
fn deadletter_and_subscription_roundtrip() {
    #[derive(Debug)]
    struct Stray(#[allow(dead_code)] u8);

    struct Keeper {
        mbox: MboxRef,
        log: SharedLog,
    }

    impl Agent for Keeper {
        fn so_define_agent(&mut self, ctx: &mut AgentContext<'_>) -> AgentResult {
            let mbox = Arc::clone(&self.mbox);

            // Round trip: subscribe, verify, drop, verify.
            ctx.so_subscribe(&mbox)
                .event(|_this: &mut Keeper, _v: &u64| {})?;
            assert!(ctx.so_has_subscription::<u64>(&mbox, None));
            ctx.so_drop_subscription::<u64>(&mbox, &ctx.so_default_state());
            assert!(!ctx.so_has_subscription::<u64>(&mbox, None));

            // A duplicate subscription in the same state is refused.
            ctx.so_subscribe(&mbox)
                .event(|_this: &mut Keeper, _v: &u64| {})?;
            let duplicate = ctx
                .so_subscribe(&mbox)
                .event(|_this: &mut Keeper, _v: &u64| {});
            assert!(matches!(
                duplicate,
                Err(RuntimeError::SubscriptionDuplicate { .. })
            ));

            ctx.so_subscribe_deadletter(&mbox, |this: &mut Keeper, _stray: &Stray| {
                this.log.lock().push_str("deadletter");
            })?;
            ctx.so_subscribe(&mbox)
                .event_signal_ctx::<Done, _, _, _>(|_this: &mut Keeper, ctx| {
                    ctx.so_deregister_agent_coop_normally();
                })?;
            Ok(())
        }
    }

    struct Done;
    impl Signal for Done {}

    let log: SharedLog = Arc::new(Mutex::new(String::new()));
    let observed = Arc::clone(&log);

    Environment::launch(move |env| {
        let mbox = env.create_mbox();
        let mut coop = env.make_coop();
        coop.add_agent(Keeper {
            mbox: Arc::clone(&mbox),
            log,
        });
        env.register_coop(coop)?;

        send(&mbox, Stray(7))?;
        send_signal::<Done>(&mbox)?;
        Ok(())
    })
    .unwrap();

    assert_eq!(observed.lock().as_str(), "deadletter");
}
