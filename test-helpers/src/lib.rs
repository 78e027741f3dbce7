pub mod mock;

use std::sync::{Arc, Mutex};

use hooks::{Producer, producer, telemetry};
use payloads::Envelope;
use tokio::sync::oneshot;
use tracing_log::LogTracer;
use tracing_subscriber::util::SubscriberInitExt;

/// Install a subscriber for tests. Safe to call from every test.
pub fn init_tracing() {
    let subscriber = telemetry::get_subscriber("error");
    let _ = LogTracer::init();
    let _ = subscriber.try_init();
}

type Reply<T> = oneshot::Sender<anyhow::Result<Envelope<T>>>;

struct Call<A, T> {
    args: A,
    reply: Option<Reply<T>>,
}

/// A producer whose calls stay pending until the test answers them, so
/// tests decide the order in which requests resolve.
///
/// Calls are numbered from 0 in the order the producer was invoked.
pub struct ScriptedProducer<A, T> {
    calls: Arc<Mutex<Vec<Call<A, T>>>>,
}

impl<A, T> Clone for ScriptedProducer<A, T> {
    fn clone(&self) -> Self {
        Self {
            calls: Arc::clone(&self.calls),
        }
    }
}

impl<A, T> Default for ScriptedProducer<A, T> {
    fn default() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<A, T> ScriptedProducer<A, T>
where
    A: Clone + Send + 'static,
    T: Send + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn producer(&self) -> Producer<A, T> {
        let calls = Arc::clone(&self.calls);
        producer(move |args: A| {
            let (reply, response) = oneshot::channel();
            calls.lock().unwrap().push(Call {
                args,
                reply: Some(reply),
            });
            async move {
                response.await.unwrap_or_else(|_| {
                    Err(anyhow::anyhow!("scripted response was never sent"))
                })
            }
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Arguments of every call so far, in call order.
    pub fn args(&self) -> Vec<A> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|call| call.args.clone())
            .collect()
    }

    /// Yield to the runtime until at least `n` calls have reached the
    /// producer.
    pub async fn wait_for_calls(&self, n: usize) {
        for _ in 0..1000 {
            if self.call_count() >= n {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!(
            "expected {n} producer calls, saw {}",
            self.call_count()
        );
    }

    /// Answer call `index`. Returns false if the call does not exist, was
    /// already answered, or its request was aborted.
    pub fn respond(
        &self,
        index: usize,
        response: anyhow::Result<Envelope<T>>,
    ) -> bool {
        let reply = self
            .calls
            .lock()
            .unwrap()
            .get_mut(index)
            .and_then(|call| call.reply.take());
        match reply {
            Some(reply) => reply.send(response).is_ok(),
            None => false,
        }
    }

    pub fn succeed(&self, index: usize, data: T) -> bool {
        self.respond(index, Ok(Envelope::ok(data)))
    }

    pub fn fail(&self, index: usize, message: &str) -> bool {
        self.respond(index, Ok(Envelope::failure(message)))
    }

    pub fn fault(&self, index: usize, message: &str) -> bool {
        self.respond(index, Err(anyhow::anyhow!(message.to_string())))
    }
}
