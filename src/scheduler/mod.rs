//! Background scheduler: a dedicated OS thread that ticks once a second,
//! evaluates cron schedules, and asks the model registry to refresh due
//! models. The scheduler never mutates table storage directly -- it
//! refreshes through the same query engine the foreground path uses,
//! which serializes its own writes via the model registry mutex.
//!
//! Commands reach the worker thread over a `crossbeam-channel`, mirroring
//! the command-channel shape used to drive the engine's other background
//! worker; `parking_lot::Mutex` guards the schedule table itself, since
//! both the worker thread and `DROP/SHOW SCHEDULES` callers touch it.

pub mod cron;

use crate::error::SchedulerError;
use cron::CronSchedule;
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleState {
    Idle,
    Armed,
    Firing,
    Backoff,
    Failed,
}

#[derive(Debug, Clone)]
pub struct Schedule {
    pub id: String,
    pub model_name: String,
    pub cron_expression: String,
    pub next_fire: chrono::NaiveDateTime,
    pub retry_count: u32,
    pub max_retries: u32,
    pub state: ScheduleState,
    cron: CronSchedule,
    tombstoned: bool,
}

impl Schedule {
    pub fn new(
        id: String,
        model_name: String,
        cron_expression: String,
        max_retries: u32,
        now: chrono::NaiveDateTime,
    ) -> Result<Schedule, SchedulerError> {
        let cron = CronSchedule::parse(&cron_expression)?;
        let next_fire = cron.next_fire(now)?;
        Ok(Schedule {
            id,
            model_name,
            cron_expression,
            next_fire,
            retry_count: 0,
            max_retries,
            state: ScheduleState::Armed,
            cron,
            tombstoned: false,
        })
    }

    fn advance(&mut self, now: chrono::NaiveDateTime) -> Result<(), SchedulerError> {
        self.next_fire = self.cron.next_fire(now)?;
        self.retry_count = 0;
        self.state = ScheduleState::Armed;
        Ok(())
    }

    fn record_failure(&mut self, now: chrono::NaiveDateTime) -> Result<(), SchedulerError> {
        self.retry_count += 1;
        if self.retry_count > self.max_retries {
            self.state = ScheduleState::Failed;
            return Err(SchedulerError::MaxRetriesExceeded(self.id.clone()));
        }
        self.state = ScheduleState::Backoff;
        // Exponential backoff capped at the cron's own cadence: retry
        // sooner than the next natural fire, never later.
        let backoff_minutes = 2u32.saturating_pow(self.retry_count).min(30) as i64;
        self.next_fire = now + chrono::Duration::minutes(backoff_minutes);
        Ok(())
    }
}

/// What fired and needs a refresh dispatched by the caller holding the
/// database/model-registry lock; the scheduler thread itself never talks
/// to the executor directly; it hands due schedules back through
/// `due_receiver` and expects [`Scheduler::report_result`] afterward.
#[derive(Debug, Clone)]
pub struct DueSchedule {
    pub schedule_id: String,
    pub model_name: String,
}

enum Command {
    Add(Schedule),
    Drop(String),
    Shutdown,
}

pub struct Scheduler {
    schedules: Arc<Mutex<Vec<Schedule>>>,
    command_tx: Sender<Command>,
    due_rx: Receiver<DueSchedule>,
    handle: Option<JoinHandle<()>>,
}

impl Scheduler {
    pub fn start(tick_interval: Duration) -> Scheduler {
        let schedules: Arc<Mutex<Vec<Schedule>>> = Arc::new(Mutex::new(Vec::new()));
        let (command_tx, command_rx) = bounded::<Command>(64);
        let (due_tx, due_rx) = bounded::<DueSchedule>(64);

        let worker_schedules = Arc::clone(&schedules);
        let handle = std::thread::spawn(move || {
            run_worker(worker_schedules, command_rx, due_tx, tick_interval);
        });

        Scheduler {
            schedules,
            command_tx,
            due_rx,
            handle: Some(handle),
        }
    }

    pub fn add_schedule(&self, schedule: Schedule) {
        let _ = self.command_tx.send(Command::Add(schedule));
    }

    pub fn drop_schedule(&self, id: &str) {
        let _ = self.command_tx.send(Command::Drop(id.to_string()));
    }

    /// Schedules due since the last poll. Non-blocking; callers integrate
    /// this into their own event loop (or spawn a draining thread).
    pub fn poll_due(&self) -> Vec<DueSchedule> {
        self.due_rx.try_iter().collect()
    }

    pub fn report_success(&self, schedule_id: &str, now: chrono::NaiveDateTime) {
        let mut schedules = self.schedules.lock();
        if let Some(s) = schedules.iter_mut().find(|s| s.id == schedule_id) {
            let _ = s.advance(now);
        }
    }

    pub fn report_failure(&self, schedule_id: &str, now: chrono::NaiveDateTime) {
        let mut schedules = self.schedules.lock();
        if let Some(s) = schedules.iter_mut().find(|s| s.id == schedule_id) {
            let _ = s.record_failure(now);
        }
    }

    pub fn list_schedules(&self) -> Vec<Schedule> {
        self.schedules.lock().clone()
    }

    pub fn shutdown(mut self) {
        let _ = self.command_tx.send(Command::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn run_worker(
    schedules: Arc<Mutex<Vec<Schedule>>>,
    command_rx: Receiver<Command>,
    due_tx: Sender<DueSchedule>,
    tick_interval: Duration,
) {
    loop {
        match command_rx.recv_timeout(tick_interval) {
            Ok(Command::Add(schedule)) => schedules.lock().push(schedule),
            Ok(Command::Drop(id)) => {
                if let Some(s) = schedules.lock().iter_mut().find(|s| s.id == id) {
                    s.tombstoned = true;
                }
            }
            Ok(Command::Shutdown) => return,
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => return,
        }

        let now = chrono::Utc::now().naive_utc();
        let mut guard = schedules.lock();
        guard.retain(|s| !s.tombstoned);
        for schedule in guard.iter_mut() {
            if schedule.state == ScheduleState::Failed {
                continue;
            }
            if schedule.next_fire <= now {
                schedule.state = ScheduleState::Firing;
                let _ = due_tx.send(DueSchedule {
                    schedule_id: schedule.id.clone(),
                    model_name: schedule.model_name.clone(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn now() -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn schedule_advances_to_next_cron_fire() {
        let mut schedule =
            Schedule::new("s1".to_string(), "m1".to_string(), "*/5 * * * *".to_string(), 3, now())
                .unwrap();
        let first_fire = schedule.next_fire;
        schedule.advance(first_fire).unwrap();
        assert!(schedule.next_fire > first_fire);
        assert_eq!(schedule.state, ScheduleState::Armed);
    }

    #[test]
    fn repeated_failures_exceed_max_retries() {
        let mut schedule =
            Schedule::new("s1".to_string(), "m1".to_string(), "* * * * *".to_string(), 2, now())
                .unwrap();
        schedule.record_failure(now()).unwrap();
        schedule.record_failure(now()).unwrap();
        let err = schedule.record_failure(now()).unwrap_err();
        assert!(matches!(err, SchedulerError::MaxRetriesExceeded(_)));
        assert_eq!(schedule.state, ScheduleState::Failed);
    }

    #[test]
    fn scheduler_reports_due_schedule_after_its_fire_time() {
        let scheduler = Scheduler::start(Duration::from_millis(20));
        let schedule = Schedule::new(
            "s1".to_string(),
            "m1".to_string(),
            "* * * * *".to_string(),
            1,
            chrono::Utc::now().naive_utc() - chrono::Duration::minutes(2),
        )
        .unwrap();
        scheduler.add_schedule(schedule);
        std::thread::sleep(Duration::from_millis(100));
        let due = scheduler.poll_due();
        assert!(!due.is_empty());
        scheduler.shutdown();
    }
}
