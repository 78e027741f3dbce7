use std::sync::{Arc, Mutex};

use hooks::{
    FetchError, FetchOptions, FetchOutcome, FetchState, RequestController,
    producer,
};
use payloads::Envelope;
use test_helpers::{ScriptedProducer, init_tracing};

type Recorded<T> = Arc<Mutex<Vec<T>>>;

fn recorder<T>() -> Recorded<T> {
    Arc::new(Mutex::new(Vec::new()))
}

#[tokio::test]
async fn immediate_fetch_starts_on_creation() -> anyhow::Result<()> {
    init_tracing();
    let script = ScriptedProducer::<(), String>::new();
    let controller =
        RequestController::new(script.producer(), FetchOptions::default());

    // loading from the start, nothing fetched yet
    assert!(controller.state().is_initial_loading());

    script.wait_for_calls(1).await;
    assert!(script.succeed(0, "hello".to_string()));

    let mut states = controller.subscribe();
    let state = states.wait_for(|state| !state.loading).await?.clone();
    assert_eq!(state.data, FetchState::Fetched("hello".to_string()));
    assert_eq!(state.error, None);
    assert_eq!(script.call_count(), 1);

    Ok(())
}

#[tokio::test]
async fn deferred_controller_starts_idle() {
    let script = ScriptedProducer::<(), u8>::new();
    let controller = RequestController::new(
        script.producer(),
        FetchOptions::default().immediate(false),
    );

    let state = controller.state();
    assert!(!state.loading);
    assert_eq!(state.data, FetchState::NotFetched);

    tokio::task::yield_now().await;
    assert_eq!(script.call_count(), 0);
}

#[tokio::test]
async fn arguments_are_forwarded_to_the_producer() {
    let script = ScriptedProducer::<(&'static str, u32), u32>::new();
    let controller = RequestController::new(
        script.producer(),
        FetchOptions::default().immediate(false),
    );

    let task = controller.fetch(("week", 2));
    script.wait_for_calls(1).await;
    assert_eq!(script.args(), vec![("week", 2)]);

    script.succeed(0, 7);
    assert_eq!(task.await, FetchOutcome::Success);
    assert_eq!(controller.state().data, FetchState::Fetched(7));
}

#[tokio::test]
async fn business_failure_keeps_previous_data() -> anyhow::Result<()> {
    init_tracing();
    let script = ScriptedProducer::<(), Vec<u32>>::new();
    let errors = recorder::<FetchError>();
    let controller = RequestController::new(
        script.producer(),
        FetchOptions::default().immediate(false).on_error({
            let errors = errors.clone();
            move |e: &FetchError| errors.lock().unwrap().push(e.clone())
        }),
    );

    let first = controller.fetch(());
    script.wait_for_calls(1).await;
    script.succeed(0, vec![1]);
    assert_eq!(first.await, FetchOutcome::Success);

    let second = controller.refetch(());
    // refetching keeps the data and clears nothing but the error
    let state = controller.state();
    assert!(state.loading);
    assert_eq!(state.data, FetchState::Fetched(vec![1]));

    script.wait_for_calls(2).await;
    script.fail(1, "quota exceeded");
    assert_eq!(
        second.await,
        FetchOutcome::Failed(FetchError::Business("quota exceeded".into()))
    );

    let state = controller.state();
    assert!(!state.loading);
    assert_eq!(state.error.as_deref(), Some("quota exceeded"));
    assert_eq!(state.data, FetchState::Fetched(vec![1]));
    assert_eq!(
        *errors.lock().unwrap(),
        vec![FetchError::Business("quota exceeded".into())]
    );

    Ok(())
}

#[tokio::test]
async fn a_new_fetch_clears_the_previous_error() {
    let script = ScriptedProducer::<(), u8>::new();
    let controller = RequestController::new(
        script.producer(),
        FetchOptions::default().immediate(false),
    );

    let task = controller.fetch(());
    script.wait_for_calls(1).await;
    script.fail(0, "quota exceeded");
    task.await;
    assert!(controller.state().error.is_some());

    let task = controller.fetch(());
    assert_eq!(controller.state().error, None);
    script.wait_for_calls(2).await;
    script.succeed(1, 4);
    assert_eq!(task.await, FetchOutcome::Success);
    assert_eq!(controller.state().error, None);
}

#[tokio::test]
async fn producer_fault_is_unexpected() {
    init_tracing();
    let script = ScriptedProducer::<(), u8>::new();
    let controller = RequestController::new(
        script.producer(),
        FetchOptions::default().immediate(false),
    );

    let task = controller.fetch(());
    script.wait_for_calls(1).await;
    script.fault(0, "connection refused");

    let outcome = task.await;
    assert_eq!(
        outcome,
        FetchOutcome::Failed(FetchError::Unexpected(
            "connection refused".into()
        ))
    );
    let state = controller.state();
    assert_eq!(state.error.as_deref(), Some("connection refused"));
    assert_eq!(state.data, FetchState::NotFetched);
    assert!(!state.loading);
}

#[tokio::test]
async fn producer_panic_is_surfaced() {
    init_tracing();
    let exploding = producer(|explode: bool| async move {
        if explode {
            panic!("exploded");
        }
        Ok(Envelope::ok(1u8))
    });
    let controller = RequestController::new(
        exploding,
        FetchOptions::default().immediate(false),
    );

    assert_eq!(controller.fetch(false).await, FetchOutcome::Success);

    let outcome = controller.fetch(true).await;
    let FetchOutcome::Failed(error) = outcome else {
        panic!("expected a failure, got {outcome:?}");
    };
    assert_eq!(error.kind(), "unexpected_fault");
    assert!(error.to_string().contains("exploded"));

    let state = controller.state();
    assert_eq!(state.data, FetchState::Fetched(1));
    assert!(!state.loading);
}

#[tokio::test]
async fn malformed_envelope_is_an_error() {
    let script = ScriptedProducer::<(), u8>::new();
    let controller = RequestController::new(
        script.producer(),
        FetchOptions::default().immediate(false),
    );

    let task = controller.fetch(());
    script.wait_for_calls(1).await;
    script.respond(
        0,
        Ok(Envelope {
            data: None,
            ..Envelope::ok(0)
        }),
    );

    let FetchOutcome::Failed(error) = task.await else {
        panic!("expected a failure");
    };
    assert_eq!(error.kind(), "malformed_envelope");
    assert!(controller.state().error.is_some());
}

#[tokio::test]
async fn transform_error_fails_the_fetch() {
    init_tracing();
    let script = ScriptedProducer::<(), Vec<u8>>::new();
    let successes = recorder::<usize>();
    let options = FetchOptions::with_transform(|data: Vec<u8>| {
        if data.is_empty() {
            anyhow::bail!("bad shape");
        }
        Ok(data.len())
    })
    .immediate(false)
    .on_success({
        let successes = successes.clone();
        move |len: &usize| successes.lock().unwrap().push(*len)
    });
    let controller = RequestController::new(script.producer(), options);

    let task = controller.fetch(());
    script.wait_for_calls(1).await;
    script.succeed(0, vec![1, 2]);
    assert_eq!(task.await, FetchOutcome::Success);
    assert_eq!(controller.state().data, FetchState::Fetched(2));

    let task = controller.fetch(());
    script.wait_for_calls(2).await;
    script.succeed(1, vec![]);
    let FetchOutcome::Failed(error) = task.await else {
        panic!("expected a failure");
    };
    assert_eq!(error.kind(), "transform_failure");

    let state = controller.state();
    assert!(state.error.as_deref().unwrap().contains("bad shape"));
    assert_eq!(state.data, FetchState::Fetched(2));
    assert_eq!(*successes.lock().unwrap(), vec![2]);
}

#[tokio::test]
async fn transform_panic_fails_the_fetch() {
    init_tracing();
    let script = ScriptedProducer::<(), u8>::new();
    let options =
        FetchOptions::with_transform(|_: u8| -> anyhow::Result<u8> {
            panic!("bad shape")
        })
        .immediate(false);
    let controller = RequestController::new(script.producer(), options);

    let task = controller.fetch(());
    script.wait_for_calls(1).await;
    script.succeed(0, 1);

    let FetchOutcome::Failed(error) = task.await else {
        panic!("expected a failure");
    };
    assert_eq!(error.kind(), "transform_failure");
    assert!(error.to_string().contains("bad shape"));
    assert_eq!(controller.state().data, FetchState::NotFetched);
}

#[tokio::test]
async fn late_response_of_superseded_fetch_is_ignored() {
    init_tracing();
    let script = ScriptedProducer::<(), Vec<u8>>::new();
    let successes = recorder::<Vec<u8>>();
    let controller = RequestController::new(
        script.producer(),
        FetchOptions::default()
            .immediate(false)
            .abort_superseded(false)
            .on_success({
                let successes = successes.clone();
                move |data: &Vec<u8>| {
                    successes.lock().unwrap().push(data.clone())
                }
            }),
    );

    let first = controller.fetch(());
    script.wait_for_calls(1).await;
    let second = controller.fetch(());
    script.wait_for_calls(2).await;

    // second resolves before first
    assert!(script.succeed(1, vec![2]));
    assert_eq!(second.await, FetchOutcome::Success);
    assert!(script.succeed(0, vec![1]));
    assert_eq!(first.await, FetchOutcome::Superseded);

    let state = controller.state();
    assert_eq!(state.data, FetchState::Fetched(vec![2]));
    assert!(!state.loading);
    assert_eq!(*successes.lock().unwrap(), vec![vec![2]]);
}

#[tokio::test]
async fn superseded_fetch_is_aborted() {
    let script = ScriptedProducer::<(), u8>::new();
    let controller = RequestController::new(
        script.producer(),
        FetchOptions::default().immediate(false),
    );

    let first = controller.fetch(());
    script.wait_for_calls(1).await;
    let second = controller.fetch(());

    assert_eq!(first.await, FetchOutcome::Superseded);
    // the aborted request dropped its end of the reply channel
    assert!(!script.succeed(0, 1));

    script.wait_for_calls(2).await;
    assert!(script.succeed(1, 2));
    assert_eq!(second.await, FetchOutcome::Success);
    assert_eq!(controller.state().data, FetchState::Fetched(2));
}

#[tokio::test]
async fn only_the_last_issued_fetch_wins() {
    let orders: [&[usize]; 4] = [
        &[0, 1, 2, 3, 4],
        &[4, 3, 2, 1, 0],
        &[3, 0, 4, 1, 2],
        &[1, 4, 0, 2, 3],
    ];

    for order in orders {
        let script = ScriptedProducer::<(), usize>::new();
        let controller = RequestController::new(
            script.producer(),
            FetchOptions::default().immediate(false).abort_superseded(false),
        );

        let mut tasks = Vec::new();
        for issued in 0..order.len() {
            tasks.push(controller.fetch(()));
            script.wait_for_calls(issued + 1).await;
        }
        for &index in order {
            assert!(script.succeed(index, index));
        }

        let mut outcomes = Vec::new();
        for task in tasks {
            outcomes.push(task.await);
        }
        let last = order.len() - 1;
        for (index, outcome) in outcomes.iter().enumerate() {
            let expected = if index == last {
                FetchOutcome::Success
            } else {
                FetchOutcome::Superseded
            };
            assert_eq!(*outcome, expected, "order {order:?}, call {index}");
        }

        let state = controller.state();
        assert_eq!(state.data, FetchState::Fetched(last), "order {order:?}");
        assert!(!state.loading);
    }
}

#[tokio::test]
async fn cancel_stops_loading_without_error() {
    let script = ScriptedProducer::<(), u8>::new();
    let errors = recorder::<FetchError>();
    let controller = RequestController::new(
        script.producer(),
        FetchOptions::default().on_error({
            let errors = errors.clone();
            move |e: &FetchError| errors.lock().unwrap().push(e.clone())
        }),
    );
    script.wait_for_calls(1).await;

    controller.cancel();

    let state = controller.state();
    assert!(!state.loading);
    assert_eq!(state.error, None);

    // a late answer to the cancelled request changes nothing
    let _ = script.succeed(0, 1);
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert_eq!(controller.state(), state);
    assert!(errors.lock().unwrap().is_empty());
}

#[tokio::test]
async fn disposal_freezes_state() {
    let script = ScriptedProducer::<(), u8>::new();
    let controller = RequestController::new(
        script.producer(),
        FetchOptions::default().immediate(false).abort_superseded(false),
    );

    let task = controller.fetch(());
    script.wait_for_calls(1).await;
    controller.dispose();
    assert!(controller.is_disposed());
    let before = controller.state();

    // disposal aborts even when superseded requests would be left running
    assert_eq!(task.await, FetchOutcome::Superseded);
    assert!(!script.succeed(0, 1));
    assert_eq!(controller.state(), before);

    // fetching after disposal never reaches the producer
    let task = controller.fetch(());
    assert!(task.is_finished());
    assert_eq!(task.await, FetchOutcome::Superseded);
    assert_eq!(script.call_count(), 1);
    assert_eq!(controller.state(), before);
}

#[tokio::test]
async fn refetch_handle_does_not_keep_controller_alive() {
    let script = ScriptedProducer::<(), u8>::new();
    let controller = RequestController::new(
        script.producer(),
        FetchOptions::default().immediate(false),
    );
    let refetch = controller.refetch_handle();

    let task = refetch.call(()).expect("controller is alive");
    script.wait_for_calls(1).await;
    script.succeed(0, 3);
    assert_eq!(task.await, FetchOutcome::Success);

    drop(controller);
    assert!(refetch.call(()).is_none());
    assert_eq!(script.call_count(), 1);
}

#[tokio::test]
async fn reconfigure_switches_producer_and_refetches() {
    let month = ScriptedProducer::<(), &'static str>::new();
    let year = ScriptedProducer::<(), &'static str>::new();
    let controller =
        RequestController::new(month.producer(), FetchOptions::default());
    month.wait_for_calls(1).await;

    // reconfiguring while the first request is pending supersedes it
    let task = controller
        .reconfigure(year.producer())
        .expect("immediate controllers refetch");

    year.wait_for_calls(1).await;
    year.succeed(0, "year");
    assert_eq!(task.await, FetchOutcome::Success);

    let _ = month.succeed(0, "month");
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert_eq!(controller.state().data, FetchState::Fetched("year"));
    assert_eq!(month.call_count(), 1);
}

#[tokio::test]
async fn reconfigure_without_immediate_only_swaps() {
    let first = ScriptedProducer::<(), u8>::new();
    let second = ScriptedProducer::<(), u8>::new();
    let controller = RequestController::new(
        first.producer(),
        FetchOptions::default().immediate(false),
    );

    let _pending = controller.fetch(());
    first.wait_for_calls(1).await;
    assert!(controller.reconfigure(second.producer()).is_none());
    assert!(!controller.state().loading);

    let task = controller.fetch(());
    second.wait_for_calls(1).await;
    second.succeed(0, 9);
    assert_eq!(task.await, FetchOutcome::Success);
    assert_eq!(controller.state().data, FetchState::Fetched(9));
}

#[tokio::test]
async fn panicking_success_callback_keeps_the_outcome() {
    init_tracing();
    let script = ScriptedProducer::<(), u8>::new();
    let controller = RequestController::new(
        script.producer(),
        FetchOptions::default()
            .immediate(false)
            .on_success(|_: &u8| panic!("callback exploded")),
    );

    let task = controller.fetch(());
    script.wait_for_calls(1).await;
    script.succeed(0, 5);

    assert_eq!(task.await, FetchOutcome::Success);
    let state = controller.state();
    assert_eq!(state.data, FetchState::Fetched(5));
    assert!(!state.loading);
    assert_eq!(state.error, None);

    // the controller keeps working afterwards
    let task = controller.fetch(());
    script.wait_for_calls(2).await;
    script.succeed(1, 6);
    assert_eq!(task.await, FetchOutcome::Success);
    assert_eq!(controller.state().data, FetchState::Fetched(6));
}

#[tokio::test]
async fn panicking_error_callback_keeps_the_outcome() {
    init_tracing();
    let script = ScriptedProducer::<(), u8>::new();
    let controller = RequestController::new(
        script.producer(),
        FetchOptions::default()
            .immediate(false)
            .on_error(|_: &FetchError| panic!("callback exploded")),
    );

    let task = controller.fetch(());
    script.wait_for_calls(1).await;
    script.fail(0, "quota exceeded");

    assert_eq!(
        task.await,
        FetchOutcome::Failed(FetchError::Business("quota exceeded".into()))
    );
    let state = controller.state();
    assert_eq!(state.error.as_deref(), Some("quota exceeded"));
    assert!(!state.loading);
}
