use std::sync::mpsc;

use eframe::egui;

/// Handle to a background job. The GUI polls it once per frame.
pub struct Task<T> {
    receiver: mpsc::Receiver<T>,
}

impl<T> Task<T> {
    /// The job's result, once, as soon as it is ready. A job that panicked
    /// never reports one.
    pub fn take_result(&self) -> Option<T> {
        self.receiver.try_recv().ok()
    }
}

/// Run `job` on its own thread and repaint `ctx` when it finishes.
pub fn spawn<T, F>(ctx: &egui::Context, job: F) -> Task<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (sender, receiver) = mpsc::channel();
    let ctx = ctx.clone();
    std::thread::spawn(move || {
        // The UI may have dropped the task; nothing to deliver then.
        let _ = sender.send(job());
        ctx.request_repaint();
    });
    Task { receiver }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    #[test]
    fn result_arrives_once() {
        let ctx = egui::Context::default();
        let task = spawn(&ctx, || 42);
        let deadline = Instant::now() + Duration::from_secs(5);
        let result = loop {
            if let Some(result) = task.take_result() {
                break result;
            }
            assert!(Instant::now() < deadline, "task never finished");
            std::thread::sleep(Duration::from_millis(5));
        };
        assert_eq!(result, 42);
        assert_eq!(task.take_result(), None);
    }

    #[test]
    fn panicked_job_reports_nothing() {
        let ctx = egui::Context::default();
        let task: Task<u8> = spawn(&ctx, || panic!("job failed"));
        let deadline = Instant::now() + Duration::from_secs(5);
        while !matches!(task.receiver.try_recv(), Err(mpsc::TryRecvError::Disconnected)) {
            assert!(Instant::now() < deadline, "job thread never ended");
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(task.take_result(), None);
    }
}
