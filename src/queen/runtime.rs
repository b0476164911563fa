//! Accept loop and shutdown control for [`Queen`].

use std::{future::Future, sync::Arc, time::Duration};

use log::warn;
use tokio::{
    net::TcpListener,
    select,
    signal,
    time::sleep,
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use super::{Hive, Queen, QueenConfig, QueenError, connection::spawn_connection_task};

impl Queen {
    /// Serve `listener` until Ctrl+C is received.
    ///
    /// # Errors
    ///
    /// See [`Queen::run_with_shutdown`].
    pub async fn run(self, listener: TcpListener) -> Result<(), QueenError> {
        self.run_with_shutdown(listener, async {
            let _ = signal::ctrl_c().await;
        })
        .await
    }

    /// Serve `listener` until `shutdown` resolves.
    ///
    /// On shutdown the accept loop stops, every connection task is cancelled
    /// and awaited, and all sessions are released.
    ///
    /// # Examples
    ///
    /// ```
    /// use hivewire::queen::Queen;
    /// use tokio::{net::TcpListener, sync::oneshot};
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), hivewire::queen::QueenError> {
    /// let listener = TcpListener::bind("127.0.0.1:0").await?;
    /// let (tx, rx) = oneshot::channel::<()>();
    /// let task = tokio::spawn(Queen::default().run_with_shutdown(listener, async {
    ///     let _ = rx.await;
    /// }));
    /// let _ = tx.send(());
    /// task.await.expect("join queen task")?;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`QueenError::Io`] if the listener's local address cannot be
    /// read. Accept failures are retried with exponential back-off and do
    /// not surface as errors.
    pub async fn run_with_shutdown<S>(
        self,
        listener: TcpListener,
        shutdown: S,
    ) -> Result<(), QueenError>
    where
        S: Future<Output = ()> + Send,
    {
        let Queen { config, hive } = self;
        let local_addr = listener.local_addr()?;
        tracing::info!(%local_addr, "queen listening");

        let shutdown_token = CancellationToken::new();
        let tracker = TaskTracker::new();
        tracker.spawn(accept_loop(
            listener,
            Arc::clone(&hive),
            config,
            shutdown_token.clone(),
            tracker.clone(),
        ));

        select! {
            () = shutdown => shutdown_token.cancel(),
            () = tracker.wait() => {},
        }

        tracker.close();
        tracker.wait().await;
        tracing::info!(%local_addr, "queen stopped");
        Ok(())
    }
}

/// Accept connections and spawn a task for each until `shutdown` fires.
async fn accept_loop(
    listener: TcpListener,
    hive: Arc<Hive>,
    config: QueenConfig,
    shutdown: CancellationToken,
    tracker: TaskTracker,
) {
    let backoff = config.backoff.normalized();
    debug_assert!(
        backoff.initial_delay <= backoff.max_delay,
        "BackoffConfig invariant violated: initial_delay > max_delay"
    );
    let mut delay = backoff.initial_delay;
    loop {
        let next: Option<Duration> = select! {
            biased;

            () = shutdown.cancelled() => None,
            res = listener.accept() => Some(match res {
                Ok((stream, _)) => {
                    spawn_connection_task(
                        stream,
                        Arc::clone(&hive),
                        config,
                        shutdown.child_token(),
                        &tracker,
                    );
                    backoff.initial_delay
                }
                Err(e) => {
                    let local_addr = listener.local_addr().ok();
                    warn!("accept error: error={e:?}, local_addr={local_addr:?}");
                    sleep(delay).await;
                    backoff.next_delay(delay)
                }
            }),
        };
        match next {
            Some(next_delay) => delay = next_delay,
            None => break,
        }
    }
}
