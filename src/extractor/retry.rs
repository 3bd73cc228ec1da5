//! リトライ処理
//!
//! 1回の通信を固定スケジュールの指数バックオフで包む。
//! 待機は注入可能な非同期関数で行う（既定は tokio::time::sleep）。

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// 既定の最大試行回数
pub const DEFAULT_MAX_ATTEMPTS: usize = 5;

/// 待機スケジュール（試行番号ごとに1要素）
pub const BACKOFF_SCHEDULE: [Duration; 5] = [
    Duration::from_secs(1),
    Duration::from_secs(2),
    Duration::from_secs(4),
    Duration::from_secs(8),
    Duration::from_secs(16),
];

/// `attempt` 回目（0始まり）の失敗後に待つ時間
///
/// スケジュールを超えた分は最後の値（16秒）を使う。
pub fn backoff_delay(attempt: usize) -> Duration {
    BACKOFF_SCHEDULE[attempt.min(BACKOFF_SCHEDULE.len() - 1)]
}

/// 待機の実装
pub trait Sleeper {
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;
}

/// tokio のタイマーで待つ
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }
}

/// 失敗時にバックオフしながら最大 `max_attempts` 回実行する
///
/// 失敗の種類は区別せず、すべて同じように再試行する。
/// 最後の試行も失敗したら、そのエラーをそのまま返す。
/// `max_attempts` が0の場合は1回だけ実行する。
pub async fn retry_with_backoff<T, E, Op, Fut, D, DFut>(
    max_attempts: usize,
    mut operation: Op,
    mut delay: D,
) -> Result<T, E>
where
    E: Display,
    Op: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    D: FnMut(Duration) -> DFut,
    DFut: Future<Output = ()>,
{
    let attempts = max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if attempt + 1 >= attempts => {
                warn!(attempt = attempt + 1, max = attempts, error = %err, "Request failed, retries exhausted");
                return Err(err);
            }
            Err(err) => {
                let wait = backoff_delay(attempt);
                warn!(
                    attempt = attempt + 1,
                    max = attempts,
                    delay_ms = wait.as_millis() as u64,
                    error = %err,
                    "Request failed, will retry"
                );
                delay(wait).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn secs(list: &[u64]) -> Vec<Duration> {
        list.iter().map(|s| Duration::from_secs(*s)).collect()
    }

    /// 最初の `failures` 回は失敗する操作で実行し、(結果, 待機履歴, 試行回数) を返す
    async fn run(failures: usize, max_attempts: usize) -> (Result<&'static str, String>, Vec<Duration>, usize) {
        let delays = RefCell::new(Vec::new());
        let calls = RefCell::new(0usize);

        let result = retry_with_backoff(
            max_attempts,
            |attempt| {
                *calls.borrow_mut() += 1;
                async move {
                    if attempt < failures {
                        Err(format!("HTTP error! status: 503 (attempt {})", attempt))
                    } else {
                        Ok("ok")
                    }
                }
            },
            |d| {
                delays.borrow_mut().push(d);
                async {}
            },
        )
        .await;

        (result, delays.into_inner(), calls.into_inner())
    }

    #[test]
    fn test_backoff_schedule() {
        let all: Vec<_> = (0..5).map(backoff_delay).collect();
        assert_eq!(all, secs(&[1, 2, 4, 8, 16]));
        assert_eq!(backoff_delay(9), Duration::from_secs(16));
    }

    #[tokio::test]
    async fn test_success_first_try_no_delay() {
        let (result, delays, calls) = run(0, 5).await;
        assert_eq!(result, Ok("ok"));
        assert!(delays.is_empty());
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_k_failures_then_success() {
        for k in 1..5 {
            let (result, delays, calls) = run(k, 5).await;
            assert_eq!(result, Ok("ok"));
            assert_eq!(delays, BACKOFF_SCHEDULE[..k].to_vec());
            assert_eq!(calls, k + 1);
        }
    }

    #[tokio::test]
    async fn test_always_failing_propagates_last_error() {
        let (result, delays, calls) = run(usize::MAX, 5).await;
        assert_eq!(result, Err("HTTP error! status: 503 (attempt 4)".to_string()));
        assert_eq!(delays, secs(&[1, 2, 4, 8]));
        assert_eq!(calls, 5);
    }

    #[tokio::test]
    async fn test_custom_max_attempts() {
        let (result, delays, calls) = run(usize::MAX, 2).await;
        assert!(result.is_err());
        assert_eq!(delays, secs(&[1]));
        assert_eq!(calls, 2);

        let (result, delays, calls) = run(usize::MAX, 0).await;
        assert!(result.is_err());
        assert!(delays.is_empty());
        assert_eq!(calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_sleeper_waits_schedule() {
        let start = tokio::time::Instant::now();
        let result: Result<(), String> = retry_with_backoff(
            3,
            |_| async { Err("down".to_string()) },
            |d| TokioSleeper.sleep(d),
        )
        .await;
        assert!(result.is_err());
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(3) && elapsed < Duration::from_secs(4));
    }
}
