//! Bounded polling for transaction execution.
//!
//! The same loop serves both layers: the polled hash is either an L1 transaction
//! hash, or the canonical hash of an L1 -> L2 transaction polled on the
//! destination chain.

use std::{fmt, time::Duration};

use async_trait::async_trait;
use tokio::sync::watch;
use zkchain_eth_client::{EthInterface, ExecutedTxStatus};
use zkchain_types::H256;

/// Time source for polling loops. Swapped out in tests so that waiting for
/// a transaction does not require real sleeps.
#[async_trait]
pub trait Clock: fmt::Debug + Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// [`Clock`] backed by the Tokio timer.
#[derive(Debug, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// How often and how many times to poll before giving up.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub interval: Duration,
    pub max_attempts: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("transaction {0:?} was not executed within {1} polling attempts")]
    Timeout(H256, usize),
    #[error("polling was interrupted by a stop request")]
    Stopped,
    #[error("eth_client error: {0}")]
    Client(#[from] zkchain_eth_client::Error),
}

/// Polls `client` until the transaction is executed, the attempts are exhausted,
/// or the stop channel fires.
///
/// An executed transaction is terminal whether it succeeded or reverted; judging
/// the status is up to the caller. The stop channel is checked before every
/// attempt and interrupts the sleeps in between, so a stop request never waits
/// for the current polling interval to elapse.
pub async fn wait_for_tx_status(
    client: &dyn EthInterface,
    tx_hash: H256,
    policy: &RetryPolicy,
    clock: &dyn Clock,
    stop_receiver: &mut watch::Receiver<bool>,
) -> Result<ExecutedTxStatus, PollError> {
    for attempt in 0..policy.max_attempts {
        if *stop_receiver.borrow() {
            return Err(PollError::Stopped);
        }
        if let Some(status) = client.get_tx_status(tx_hash).await? {
            return Ok(status);
        }

        if attempt + 1 < policy.max_attempts {
            tokio::select! {
                changed = stop_receiver.changed() => {
                    // A closed channel means the sender was dropped; treat it as a stop request.
                    if changed.is_err() || *stop_receiver.borrow() {
                        return Err(PollError::Stopped);
                    }
                }
                () = clock.sleep(policy.interval) => { /* proceed to the next attempt */ }
            }
        }
    }
    Err(PollError::Timeout(tx_hash, policy.max_attempts))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use assert_matches::assert_matches;
    use zkchain_eth_client::clients::MockChain;
    use zkchain_types::{web3::contract::Options, Address};

    use super::*;
    use crate::testonly::ExecutingClock;

    const POLICY: RetryPolicy = RetryPolicy {
        interval: Duration::from_millis(1),
        max_attempts: 4,
    };

    #[derive(Debug, Default)]
    struct CountingClock {
        sleeps: AtomicUsize,
    }

    #[async_trait]
    impl Clock for CountingClock {
        async fn sleep(&self, _duration: Duration) {
            self.sleeps.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[tokio::test]
    async fn returning_status_once_tx_is_executed() {
        let client = MockChain::default();
        let signed = client
            .sign_prepared_tx(
                vec![1, 2, 3],
                Address::repeat_byte(0x22),
                Options {
                    nonce: Some(0.into()),
                    ..Options::default()
                },
            )
            .unwrap();
        let tx_hash = client.send_raw_tx(signed.raw_tx).await.unwrap();

        let clock = ExecutingClock(client.clone());
        let (_stop_sender, mut stop_receiver) = watch::channel(false);
        let status = wait_for_tx_status(&client, tx_hash, &POLICY, &clock, &mut stop_receiver)
            .await
            .unwrap();
        assert_eq!(status.tx_hash, tx_hash);
        assert!(status.success);
    }

    #[tokio::test]
    async fn timing_out_on_missing_tx() {
        let client = MockChain::default();
        let clock = CountingClock::default();
        let (_stop_sender, mut stop_receiver) = watch::channel(false);

        let tx_hash = H256::repeat_byte(0x42);
        let err = wait_for_tx_status(&client, tx_hash, &POLICY, &clock, &mut stop_receiver)
            .await
            .unwrap_err();
        assert_matches!(err, PollError::Timeout(hash, 4) if hash == tx_hash);
        // No sleep after the last attempt.
        assert_eq!(clock.sleeps.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn stopping_before_the_first_attempt() {
        let client = MockChain::default();
        let (stop_sender, mut stop_receiver) = watch::channel(false);
        stop_sender.send(true).unwrap();

        let err = wait_for_tx_status(
            &client,
            H256::repeat_byte(0x42),
            &POLICY,
            &SystemClock,
            &mut stop_receiver,
        )
        .await
        .unwrap_err();
        assert_matches!(err, PollError::Stopped);
    }

    #[tokio::test]
    async fn stopping_interrupts_the_sleep() {
        // A clock that never returns; only the stop request can end the wait.
        #[derive(Debug)]
        struct FrozenClock;

        #[async_trait]
        impl Clock for FrozenClock {
            async fn sleep(&self, _duration: Duration) {
                std::future::pending().await
            }
        }

        let client = MockChain::default();
        let (stop_sender, mut stop_receiver) = watch::channel(false);
        tokio::spawn(async move {
            stop_sender.send(true).ok();
        });

        let err = wait_for_tx_status(
            &client,
            H256::repeat_byte(0x42),
            &POLICY,
            &FrozenClock,
            &mut stop_receiver,
        )
        .await
        .unwrap_err();
        assert_matches!(err, PollError::Stopped);
    }
}
