//! Demo tasks, shared by the `demo` pipeline and the `worker` register

use forkline_core::Task;
use forkline_execution::TaskRegister;
use std::hint::black_box;
use std::time::Duration;

pub const HARD_WORK: &str = "hard_work";
pub const WAIT: &str = "wait";
pub const QUICK: &str = "quick";
pub const FAIL: &str = "fail";

const HARD_WORK_ITERATIONS: u64 = 1_000_000_000;

/// Burn CPU for a while, standing in for a useful synchronous function
pub fn hard_work() -> anyhow::Result<()> {
    let mut total = 0.0_f64;
    for _ in 0..HARD_WORK_ITERATIONS {
        total += black_box(123.456_f64).sqrt();
    }
    black_box(total);
    Ok(())
}

/// Sleep for `duration`, standing in for a useful asynchronous function
pub fn wait(duration: Duration) -> Task {
    Task::named(WAIT, move || async move {
        tokio::time::sleep(duration).await;
        Ok(())
    })
}

/// Everything a demo worker can run by name
pub fn register() -> TaskRegister {
    TaskRegister::new()
        .with_task(HARD_WORK, Task::from_fn(hard_work))
        .with_task(WAIT, wait(Duration::from_millis(1500)))
        .with_task(QUICK, Task::from_fn(|| Ok(())))
        .with_task(
            FAIL,
            Task::from_fn(|| anyhow::bail!("task failed on purpose")),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_contents() {
        let register = register();
        assert_eq!(register.names(), vec![FAIL, HARD_WORK, QUICK, WAIT]);
    }

    #[tokio::test]
    async fn test_demo_tasks_settle() {
        let register = register();
        assert!(register.get(QUICK).unwrap().run().await.is_ok());

        let err = register.get(FAIL).unwrap().run().await.unwrap_err();
        assert_eq!(err.message, "task failed on purpose");

        tokio::time::pause();
        assert!(wait(Duration::from_secs(60)).run().await.is_ok());
    }
}
