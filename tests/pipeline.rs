//! Execution-order and failure-propagation tests for the pipeline engine.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use interlace::pipeline::{ContextState, Pipeline, PipelineError, PipelinePhase};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

type Events = Arc<Mutex<Vec<String>>>;

#[derive(Debug, Error)]
#[error("unsupported: {0}")]
struct Unsupported(&'static str);

fn log(events: &Events, line: String) {
    events.lock().unwrap().push(line);
}

fn snapshot(events: &Events) -> Vec<String> {
    events.lock().unwrap().clone()
}

fn single_phase() -> (PipelinePhase, Pipeline<String, ()>) {
    let phase = PipelinePhase::new("Phase");
    let pipeline = Pipeline::with_name("main", &[phase.clone()]);
    (phase, pipeline)
}

/// Registers an interceptor that logs, proceeds, and logs the outcome.
fn wrapping(pipeline: &mut Pipeline<String, ()>, phase: &PipelinePhase, events: &Events, id: &'static str) {
    let events = events.clone();
    pipeline
        .intercept(phase, move |ctx| {
            let events = events.clone();
            Box::pin(async move {
                let subject = ctx.subject().clone();
                log(&events, format!("intercept{id} {subject}"));
                match ctx.proceed().await {
                    Ok(()) => log(&events, format!("success{id} {subject}")),
                    Err(_) => log(&events, format!("fail{id} {subject}")),
                }
                Ok(())
            })
        })
        .unwrap();
}

#[tokio::test]
async fn test_empty_pipeline_returns_subject() {
    let (_, pipeline) = single_phase();
    let result = pipeline.execute((), "some".to_string()).await.unwrap();
    assert_eq!(result, "some");
}

#[tokio::test]
async fn test_implicit_proceed() {
    let events = Events::default();
    let (phase, mut pipeline) = single_phase();
    for id in 1..=2 {
        let events = events.clone();
        pipeline
            .intercept(&phase, move |ctx| {
                let events = events.clone();
                Box::pin(async move {
                    log(&events, format!("intercept{id} {}", ctx.subject()));
                    Ok(())
                })
            })
            .unwrap();
    }

    pipeline.execute((), "some".into()).await.unwrap();
    assert_eq!(snapshot(&events), vec!["intercept1 some", "intercept2 some"]);
}

#[tokio::test]
async fn test_phase_order_then_registration_order() {
    let events = Events::default();
    let first = PipelinePhase::new("first");
    let second = PipelinePhase::new("second");
    let third = PipelinePhase::new("third");
    let mut pipeline: Pipeline<String, ()> = Pipeline::new(&[first.clone(), third.clone()]);
    pipeline.insert_phase_before(&third, second.clone()).unwrap();

    // Registered out of phase order on purpose
    for (phase, label) in [(&third, "t1"), (&first, "f1"), (&second, "s1"), (&first, "f2"), (&third, "t2")] {
        let events = events.clone();
        pipeline
            .intercept(phase, move |ctx| {
                let events = events.clone();
                Box::pin(async move {
                    log(&events, label.to_string());
                    ctx.proceed().await
                })
            })
            .unwrap();
    }

    pipeline.execute((), String::new()).await.unwrap();
    assert_eq!(snapshot(&events), vec!["f1", "f2", "s1", "t1", "t2"]);
}

#[tokio::test]
async fn test_intercept_unregistered_phase() {
    let (_, mut pipeline) = single_phase();
    let other = PipelinePhase::new("other");
    let err = pipeline
        .intercept(&other, |ctx| Box::pin(async move { ctx.proceed().await }))
        .unwrap_err();
    assert!(matches!(err, PipelineError::InvalidPhase(_)));
}

#[tokio::test]
async fn test_finish_order() {
    let events = Events::default();
    let (phase, mut pipeline) = single_phase();
    wrapping(&mut pipeline, &phase, &events, "1");
    wrapping(&mut pipeline, &phase, &events, "2");

    pipeline.execute((), "some".into()).await.unwrap();
    assert_eq!(
        snapshot(&events),
        vec!["intercept1 some", "intercept2 some", "success2 some", "success1 some"]
    );
}

#[tokio::test]
async fn test_finish_skips_remaining() {
    let events = Events::default();
    let (phase, mut pipeline) = single_phase();
    wrapping(&mut pipeline, &phase, &events, "1");

    let ev = events.clone();
    pipeline
        .intercept(&phase, move |ctx| {
            let ev = ev.clone();
            Box::pin(async move {
                log(&ev, "finishing".into());
                ctx.finish();
                assert_eq!(ctx.state(), ContextState::Finished);
                // proceed after finish is a no-op
                ctx.proceed().await
            })
        })
        .unwrap();
    wrapping(&mut pipeline, &phase, &events, "3");

    let result = pipeline.execute((), "some".into()).await.unwrap();
    assert_eq!(result, "some");
    assert_eq!(snapshot(&events), vec!["intercept1 some", "finishing", "success1 some"]);
}

#[tokio::test]
async fn test_proceed_with_transforms_subject() {
    let (phase, mut pipeline) = single_phase();
    let seen_after = Arc::new(Mutex::new(String::new()));

    let seen = seen_after.clone();
    pipeline
        .intercept(&phase, move |ctx| {
            let seen = seen.clone();
            Box::pin(async move {
                ctx.proceed().await?;
                // Outer interceptor observes the value set downstream
                *seen.lock().unwrap() = ctx.subject().clone();
                let wrapped = format!("<{}>", ctx.subject());
                ctx.set_subject(wrapped);
                Ok(())
            })
        })
        .unwrap();
    pipeline
        .intercept(&phase, |ctx| {
            Box::pin(async move {
                let upper = ctx.subject().to_uppercase();
                ctx.proceed_with(upper).await
            })
        })
        .unwrap();
    pipeline
        .intercept(&phase, |ctx| {
            Box::pin(async move {
                assert_eq!(ctx.subject(), "SOME");
                Ok(())
            })
        })
        .unwrap();

    let result = pipeline.execute((), "some".into()).await.unwrap();
    assert_eq!(*seen_after.lock().unwrap(), "SOME");
    assert_eq!(result, "<SOME>");
}

#[tokio::test]
async fn test_fail_order_and_recovery() {
    let events = Events::default();
    let (phase, mut pipeline) = single_phase();
    wrapping(&mut pipeline, &phase, &events, "1");

    let ev = events.clone();
    pipeline
        .intercept(&phase, move |ctx| {
            let ev = ev.clone();
            Box::pin(async move {
                log(&ev, format!("intercept2 {}", ctx.subject()));
                let err = ctx.fail(Unsupported("1"));
                log(&ev, format!("fail2 {}", ctx.subject()));
                Err(err)
            })
        })
        .unwrap();
    wrapping(&mut pipeline, &phase, &events, "3");

    // Interceptor 1 recovers, so the execution succeeds
    pipeline.execute((), "some".into()).await.unwrap();
    assert_eq!(
        snapshot(&events),
        vec!["intercept1 some", "intercept2 some", "fail2 some", "fail1 some"]
    );
}

#[tokio::test]
async fn test_thrown_error_observed_by_every_enclosing_interceptor() {
    let events = Events::default();
    let (phase, mut pipeline) = single_phase();

    for id in 1..=3 {
        let events = events.clone();
        pipeline
            .intercept(&phase, move |ctx| {
                let events = events.clone();
                Box::pin(async move {
                    if let Err(err) = ctx.proceed().await {
                        log(&events, format!("observed{id} {err}"));
                        return Err(err);
                    }
                    Ok(())
                })
            })
            .unwrap();
    }
    pipeline
        .intercept(&phase, |_ctx| {
            Box::pin(async move { Err(PipelineError::failed(Unsupported("body"))) })
        })
        .unwrap();

    let err = pipeline.execute((), "some".into()).await.unwrap_err();
    assert_eq!(err.downcast_ref::<Unsupported>().map(|e| e.0), Some("body"));
    assert_eq!(
        snapshot(&events),
        vec![
            "observed3 unsupported: body",
            "observed2 unsupported: body",
            "observed1 unsupported: body",
        ]
    );

    let trace = err.trace().unwrap();
    let indexes: Vec<usize> = trace.frames().iter().map(|f| f.index).collect();
    assert_eq!(indexes, vec![0, 1, 2, 3]);
}

#[tokio::test]
async fn test_proceed_after_failure_is_terminated() {
    let (phase, mut pipeline) = single_phase();
    let retried = Arc::new(Mutex::new(None));

    let slot = retried.clone();
    pipeline
        .intercept(&phase, move |ctx| {
            let slot = slot.clone();
            Box::pin(async move {
                if ctx.proceed().await.is_err() {
                    let again = ctx.proceed().await;
                    *slot.lock().unwrap() = Some(matches!(again, Err(PipelineError::Terminated)));
                }
                Ok(())
            })
        })
        .unwrap();
    pipeline
        .intercept(&phase, |ctx| Box::pin(async move { Err(ctx.fail("nope")) }))
        .unwrap();

    pipeline.execute((), "x".into()).await.unwrap();
    assert_eq!(*retried.lock().unwrap(), Some(true));
}

#[tokio::test]
async fn test_nested_forks_success() {
    let events = Events::default();
    let (phase, mut p1) = single_phase();

    let ev = events.clone();
    let nested_phase = phase.clone();
    p1.intercept(&phase, move |ctx| {
        let ev = ev.clone();
        let phase = nested_phase.clone();
        Box::pin(async move {
            log(&ev, format!("intercept-p1-1 {}", ctx.subject()));

            let mut p2: Pipeline<String, ()> = Pipeline::with_name("p2", &[phase.clone()]);
            let ev2 = ev.clone();
            let inner_phase = phase.clone();
            p2.intercept(&phase, move |ctx| {
                let ev = ev2.clone();
                let phase = inner_phase.clone();
                Box::pin(async move {
                    log(&ev, format!("intercept-p2-1 {}", ctx.subject()));
                    let mut p3: Pipeline<String, ()> = Pipeline::with_name("p3", &[phase.clone()]);
                    for id in 1..=2 {
                        let ev = ev.clone();
                        p3.intercept(&phase, move |ctx| {
                            let ev = ev.clone();
                            Box::pin(async move {
                                log(&ev, format!("intercept-p3-{id} {}", ctx.subject()));
                                ctx.proceed().await
                            })
                        })?;
                    }
                    ctx.fork(&p3, (), "p3".into()).await?;
                    ctx.proceed().await?;
                    log(&ev, format!("success-p2-1 {}", ctx.subject()));
                    Ok(())
                })
            })?;

            ctx.fork(&p2, (), "p2".into()).await?;
            ctx.proceed().await?;
            log(&ev, format!("success-p1-1 {}", ctx.subject()));
            Ok(())
        })
    })
    .unwrap();

    let ev = events.clone();
    p1.intercept(&phase, move |ctx| {
        let ev = ev.clone();
        Box::pin(async move {
            log(&ev, format!("intercept-p1-2 {}", ctx.subject()));
            ctx.proceed().await
        })
    })
    .unwrap();

    p1.execute((), "p1".into()).await.unwrap();
    assert_eq!(
        snapshot(&events),
        vec![
            "intercept-p1-1 p1",
            "intercept-p2-1 p2",
            "intercept-p3-1 p3",
            "intercept-p3-2 p3",
            "success-p2-1 p2",
            "intercept-p1-2 p1",
            "success-p1-1 p1",
        ]
    );
}

#[tokio::test]
async fn test_fork_failure_is_catchable() {
    let events = Events::default();
    let (phase, mut pipeline) = single_phase();

    let ev = events.clone();
    let inner_phase = phase.clone();
    pipeline
        .intercept(&phase, move |ctx| {
            let ev = ev.clone();
            let phase = inner_phase.clone();
            Box::pin(async move {
                let mut nested: Pipeline<String, ()> = Pipeline::with_name("nested", &[phase.clone()]);
                nested.intercept(&phase, |ctx| {
                    Box::pin(async move { Err(ctx.fail(Unsupported("nested"))) })
                })?;

                match ctx.fork(&nested, (), "another".into()).await {
                    Ok(_) => log(&ev, "nested ok".into()),
                    Err(err) => log(&ev, format!("caught {err}")),
                }
                ctx.proceed().await
            })
        })
        .unwrap();

    let ev = events.clone();
    pipeline
        .intercept(&phase, move |ctx| {
            let ev = ev.clone();
            Box::pin(async move {
                log(&ev, format!("after {}", ctx.subject()));
                Ok(())
            })
        })
        .unwrap();

    pipeline.execute((), "some".into()).await.unwrap();
    assert_eq!(snapshot(&events), vec!["caught unsupported: nested", "after some"]);
}

#[tokio::test]
async fn test_fork_failure_propagates_with_trace() {
    let events = Events::default();
    let (phase, mut pipeline) = single_phase();
    let ev = events.clone();
    pipeline
        .intercept(&phase, move |ctx| {
            let ev = ev.clone();
            Box::pin(async move {
                let result = ctx.proceed().await;
                if result.is_err() {
                    log(&ev, format!("fail1 {}", ctx.subject()));
                }
                result
            })
        })
        .unwrap();

    let inner_phase = phase.clone();
    pipeline
        .intercept(&phase, move |ctx| {
            let phase = inner_phase.clone();
            Box::pin(async move {
                let mut nested: Pipeline<String, ()> = Pipeline::with_name("nested", &[phase.clone()]);
                nested.intercept(&phase, |ctx| Box::pin(async move { ctx.proceed().await }))?;
                nested.intercept(&phase, |_ctx| {
                    Box::pin(async move { Err(PipelineError::failed(Unsupported("deep"))) })
                })?;
                ctx.fork(&nested, (), "another".into()).await?;
                ctx.proceed().await
            })
        })
        .unwrap();

    let err = pipeline.execute((), "some".into()).await.unwrap_err();
    assert_eq!(snapshot(&events), vec!["fail1 some"]);
    assert!(err.downcast_ref::<Unsupported>().is_some());

    let frames: Vec<String> = err
        .trace()
        .unwrap()
        .frames()
        .iter()
        .map(ToString::to_string)
        .collect();
    assert_eq!(
        frames,
        vec!["main::Phase[0]", "main::Phase[1]", "nested::Phase[0]", "nested::Phase[1]"]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_async_suspension_resumes_in_place() {
    let events = Events::default();
    let (phase, mut pipeline) = single_phase();

    let ev = events.clone();
    pipeline
        .intercept(&phase, move |ctx| {
            let ev = ev.clone();
            Box::pin(async move {
                log(&ev, format!("intercept1 {}", ctx.subject()));
                // Hop through another task before continuing
                let subject = ctx.subject().clone();
                let future = tokio::spawn(async move { format!("future1 {subject}") })
                    .await
                    .map_err(PipelineError::failed)?;
                log(&ev, future);
                ctx.proceed().await?;
                log(&ev, format!("success1 {}", ctx.subject()));
                Ok(())
            })
        })
        .unwrap();

    let ev = events.clone();
    pipeline
        .intercept(&phase, move |ctx| {
            let ev = ev.clone();
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                tokio::task::yield_now().await;
                log(&ev, format!("intercept2 {}", ctx.subject()));
                Ok(())
            })
        })
        .unwrap();

    let pipeline = Arc::new(pipeline);
    let mut handles = Vec::new();
    for _ in 0..8 {
        let pipeline = pipeline.clone();
        handles.push(tokio::spawn(async move { pipeline.execute((), "some".into()).await }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), "some");
    }

    // Each execution logs the same four lines, in order
    let lines = snapshot(&events);
    assert_eq!(lines.len(), 32);
    for expected in ["intercept1 some", "future1 some", "intercept2 some", "success1 some"] {
        assert_eq!(lines.iter().filter(|l| *l == expected).count(), 8);
    }
}

#[tokio::test]
async fn test_cancellation_propagates_as_failure() {
    let events = Events::default();
    let (phase, mut pipeline) = single_phase();
    let token = CancellationToken::new();
    let ran = Arc::new(AtomicUsize::new(0));

    let ev = events.clone();
    let cancel = token.clone();
    pipeline
        .intercept(&phase, move |ctx| {
            let ev = ev.clone();
            let cancel = cancel.clone();
            Box::pin(async move {
                cancel.cancel();
                let result = ctx.proceed().await;
                if let Err(err) = &result {
                    log(&ev, format!("cleanup after {err}"));
                }
                result
            })
        })
        .unwrap();

    let counter = ran.clone();
    pipeline
        .intercept(&phase, move |_ctx| {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        })
        .unwrap();

    let err = pipeline
        .execute_with_cancellation((), "some".into(), token)
        .await
        .unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(ran.load(Ordering::SeqCst), 0);
    assert_eq!(snapshot(&events), vec!["cleanup after Pipeline execution was cancelled"]);
}

#[tokio::test]
async fn test_cancellable_wait_is_interrupted() {
    let (phase, mut pipeline) = single_phase();
    let token = CancellationToken::new();

    pipeline
        .intercept(&phase, |ctx| {
            Box::pin(async move {
                ctx.cancellable(tokio::time::sleep(Duration::from_secs(30))).await?;
                ctx.proceed().await
            })
        })
        .unwrap();

    let cancel = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
    });

    let err = tokio::time::timeout(
        Duration::from_secs(5),
        pipeline.execute_with_cancellation((), "x".into(), token),
    )
    .await
    .expect("cancellation should interrupt the wait")
    .unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(err.trace().unwrap().frames().len(), 1);
}
