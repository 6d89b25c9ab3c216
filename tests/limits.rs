//! Message limits: drop, redirect chains, transform.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use agentry::prelude::*;

struct Hold;
impl Signal for Hold {}

struct Done;
impl Signal for Done {}

#[derive(Debug)]
struct Req;

#[derive(Debug)]
struct Response(&'static str);

/// Three workers chained with `limit 1 → redirect to next`; three requests
/// sent while the first worker's thread is busy spread across the chain.
#[test]
fn limit_redirect_chain() {
    struct Worker {
        tag: &'static str,
        collector: MboxRef,
    }

    impl Agent for Worker {
        fn so_define_agent(&mut self, ctx: &mut AgentContext<'_>) -> AgentResult {
            ctx.so_subscribe_self()
                .event(|this: &mut Worker, _req: &Req| {
                    let _ = send(&this.collector, Response(this.tag));
                })?;
            Ok(())
        }
    }

    /// The first worker also drives the test: its Hold handler sends the
    /// three requests while the shared worker thread is occupied, which
    /// makes the queue states deterministic.
    struct HoldingWorker {
        tag: &'static str,
        collector: MboxRef,
        first: Option<MboxRef>,
    }

    impl Agent for HoldingWorker {
        fn so_define_agent(&mut self, ctx: &mut AgentContext<'_>) -> AgentResult {
            self.first = Some(ctx.so_direct_mbox());
            ctx.so_subscribe_self()
                .event(|this: &mut HoldingWorker, _req: &Req| {
                    let _ = send(&this.collector, Response(this.tag));
                })?;
            ctx.so_subscribe_self()
                .event_signal::<Hold, _, _, _>(|this: &mut HoldingWorker| {
                    if let Some(first) = &this.first {
                        for _ in 0..3 {
                            let _ = send(first, Req);
                        }
                    }
                })?;
            Ok(())
        }
    }

    struct Collector {
        mbox: MboxRef,
        log: Arc<Mutex<String>>,
        seen: usize,
    }

    impl Agent for Collector {
        fn so_define_agent(&mut self, ctx: &mut AgentContext<'_>) -> AgentResult {
            let mbox = Arc::clone(&self.mbox);
            ctx.so_subscribe(&mbox)
                .event_ctx(|this: &mut Collector, ctx, response: &Response| {
                    this.log.lock().push_str(&format!("[{}]", response.0));
                    this.seen += 1;
                    if this.seen == 3 {
                        ctx.so_deregister_agent_coop_normally();
                    }
                })?;
            Ok(())
        }
    }

    let log: Arc<Mutex<String>> = Arc::new(Mutex::new(String::new()));
    let observed = Arc::clone(&log);

    Environment::launch(move |env| {
        let workers_disp =
            OneThreadDispatcher::new(env, "workers", DispatcherParams::default());
        let collector_mbox = env.create_mbox();

        let mut coop = env.make_coop_with_binder(workers_disp.binder());

        // Build back to front so each worker can redirect to the next.
        let w3 = coop.add_agent_with_options(
            Worker {
                tag: "three",
                collector: Arc::clone(&collector_mbox),
            },
            AgentOptions::new(),
        );
        let w3_target = w3.clone();
        let w2 = coop.add_agent_with_options(
            Worker {
                tag: "two",
                collector: Arc::clone(&collector_mbox),
            },
            AgentOptions::new().limit(MessageLimit::redirect::<Req, _>(1, move || {
                w3_target.clone()
            })),
        );
        let w2_target = w2.clone();
        let w1 = coop.add_agent_with_options(
            HoldingWorker {
                tag: "one",
                collector: Arc::clone(&collector_mbox),
                first: None,
            },
            AgentOptions::new().limit(MessageLimit::redirect::<Req, _>(1, move || {
                w2_target.clone()
            })),
        );

        coop.add_agent(Collector {
            mbox: Arc::clone(&collector_mbox),
            log,
            seen: 0,
        });
        env.register_coop(coop)?;

        send_signal::<Hold>(&w1)?;
        Ok(())
    })
    .unwrap();

    assert_eq!(observed.lock().as_str(), "[one][two][three]");
}

/// Limit with the drop reaction: deliveries above the cap vanish silently.
#[test]
fn limit_drop_discards_overflow() {
    struct Counter {
        hits: Arc<AtomicUsize>,
        mbox: Option<MboxRef>,
    }

    impl Agent for Counter {
        fn so_define_agent(&mut self, ctx: &mut AgentContext<'_>) -> AgentResult {
            self.mbox = Some(ctx.so_direct_mbox());
            ctx.so_subscribe_self()
                .event_signal::<Hold, _, _, _>(|this: &mut Counter| {
                    if let Some(mbox) = &this.mbox {
                        // All five queued while this handler occupies the
                        // worker: only two fit under the limit.
                        for _ in 0..5 {
                            let _ = send(mbox, Req);
                        }
                    }
                })?;
            ctx.so_subscribe_self()
                .event(|this: &mut Counter, _req: &Req| {
                    this.hits.fetch_add(1, Ordering::SeqCst);
                })?;
            ctx.so_subscribe_self()
                .event_signal_ctx::<Done, _, _, _>(|_this: &mut Counter, ctx| {
                    ctx.so_deregister_agent_coop_normally();
                })?;
            Ok(())
        }
    }

    let hits = Arc::new(AtomicUsize::new(0));
    let observed = Arc::clone(&hits);

    Environment::launch(move |env| {
        let mut coop = env.make_coop();
        let mbox = coop.add_agent_with_options(
            Counter {
                hits: Arc::clone(&hits),
                mbox: None,
            },
            AgentOptions::new().limit(MessageLimit::drop::<Req>(2)),
        );
        env.register_coop(coop)?;

        send_signal::<Hold>(&mbox)?;
        std::thread::sleep(Duration::from_millis(100));
        send_signal::<Done>(&mbox)?;
        Ok(())
    })
    .unwrap();

    assert_eq!(observed.load(Ordering::SeqCst), 2);
}

/// Limit with a transform reaction: overflow is rewritten into another
/// message and delivered elsewhere.
#[test]
fn limit_transform_rewrites_overflow() {
    #[derive(Debug)]
    struct Overflowed(#[allow(dead_code)] u8);

    struct Busy {
        mbox: Option<MboxRef>,
        handled: Arc<AtomicUsize>,
    }

    impl Agent for Busy {
        fn so_define_agent(&mut self, ctx: &mut AgentContext<'_>) -> AgentResult {
            self.mbox = Some(ctx.so_direct_mbox());
            ctx.so_subscribe_self()
                .event_signal::<Hold, _, _, _>(|this: &mut Busy| {
                    if let Some(mbox) = &this.mbox {
                        for _ in 0..3 {
                            let _ = send(mbox, Req);
                        }
                    }
                })?;
            ctx.so_subscribe_self()
                .event(|this: &mut Busy, _req: &Req| {
                    this.handled.fetch_add(1, Ordering::SeqCst);
                })?;
            Ok(())
        }
    }

    struct Sink {
        mbox: MboxRef,
        transformed: Arc<AtomicUsize>,
    }

    impl Agent for Sink {
        fn so_define_agent(&mut self, ctx: &mut AgentContext<'_>) -> AgentResult {
            let mbox = Arc::clone(&self.mbox);
            ctx.so_subscribe(&mbox)
                .event_ctx(|this: &mut Sink, ctx, _overflow: &Overflowed| {
                    if this.transformed.fetch_add(1, Ordering::SeqCst) == 1 {
                        ctx.so_deregister_agent_coop_normally();
                    }
                })?;
            Ok(())
        }
    }

    let handled = Arc::new(AtomicUsize::new(0));
    let transformed = Arc::new(AtomicUsize::new(0));
    let observed_handled = Arc::clone(&handled);
    let observed_transformed = Arc::clone(&transformed);

    Environment::launch(move |env| {
        let overflow_mbox = env.create_mbox();

        let mut coop = env.make_coop();
        let target = Arc::clone(&overflow_mbox);
        let busy_mbox = coop.add_agent_with_options(
            Busy {
                mbox: None,
                handled: Arc::clone(&handled),
            },
            AgentOptions::new().limit(MessageLimit::transform::<Req, _>(1, move |_req| {
                Some(TransformedMessage::new(target.clone(), Overflowed(1)))
            })),
        );
        coop.add_agent(Sink {
            mbox: Arc::clone(&overflow_mbox),
            transformed: Arc::clone(&transformed),
        });
        env.register_coop(coop)?;

        send_signal::<Hold>(&busy_mbox)?;
        Ok(())
    })
    .unwrap();

    assert_eq!(observed_handled.load(Ordering::SeqCst), 1);
    assert_eq!(observed_transformed.load(Ordering::SeqCst), 2);
}
