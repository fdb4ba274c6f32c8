//! Scheduling scenarios driven through the public scheduler API.

mod common;

use common::{config, id, Harness};
use rkos::config::{Discipline, NO_PENDING_WAKEUP};
use rkos::error::KernelFault;
use rkos::scheduler::CpuState;
use rkos::task::{TaskConfig, TaskId, TaskState};

#[test]
fn reserve_violation_clamps_budget_and_suspends() {
    let mut h = Harness::new(config(Discipline::FixedPriority));
    let a = h.install(1, 3, 1000, 100);

    assert_eq!(h.pass(0).task, a);
    h.task_mut(a).cpu_remaining = 10;

    let dispatch = h.pass(20);

    assert_eq!(
        h.log.last(),
        Some(&KernelFault::ReserveViolation { task: a, elapsed: 20, overrun: 10 })
    );
    assert_eq!(h.log.reserve_violations(), 1);
    assert_eq!(h.task(a).cpu_remaining, 0);
    assert_eq!(h.task(a).state, TaskState::Suspended);
    assert_eq!(h.task(a).stats.reserve_violations, 1);
    assert!(!h.sched.ready_queue().contains(a));
    assert_eq!(dispatch.task, TaskId::IDLE);
}

#[test]
fn suspended_task_promoted_when_wakeup_expires() {
    let mut h = Harness::new(config(Discipline::FixedPriority));
    let b = h.install_with(1, TaskConfig { priority: 2, period: 100, cpu_reserve: 20, offset: 5 });
    assert_eq!(h.task(b).state, TaskState::Suspended);
    assert!(!h.sched.ready_queue().contains(b));

    let dispatch = h.pass(5);

    let tcb = h.task(b);
    assert_eq!(tcb.state, TaskState::Ready);
    assert_eq!(tcb.cpu_remaining, 20);
    assert_eq!(tcb.next_wakeup, 100);
    assert!(h.sched.ready_queue().contains(b));
    assert_eq!(dispatch.task, b);
}

#[test]
fn missed_deadline_is_logged_and_resynchronized() {
    let mut h = Harness::new(config(Discipline::FixedPriority));
    let c = h.install(1, 1, 50, 0);
    h.task_mut(c).next_period = 3;

    h.pass(10);

    assert_eq!(h.log.last(), Some(&KernelFault::DeadlineMiss { task: c, overrun: 7 }));
    assert_eq!(h.task(c).next_period, 50);
    assert_eq!(h.task(c).stats.deadline_misses, 1);
    // Logged only: the task keeps running
    assert_eq!(h.task(c).state, TaskState::Ready);
}

#[test]
fn idle_sleep_trimmed_by_wake_latency() {
    let mut h = Harness::new(config(Discipline::FixedPriority));
    h.install_with(1, TaskConfig { priority: 1, period: 1000, cpu_reserve: 0, offset: 500 });

    let dispatch = h.pass(0);

    assert_eq!(dispatch.task, TaskId::IDLE);
    assert_eq!(dispatch.sleep_ticks, 450);
    assert_eq!(h.timer.last_programmed(), Some(450));
    assert_eq!(h.sched.baseline(), 450);
    assert_eq!(h.sched.cpu_state(), CpuState::Idle);
}

#[test]
fn idle_sleep_shorter_than_latency_after_trim_uses_boundary() {
    let mut h = Harness::new(config(Discipline::FixedPriority));
    h.install_with(1, TaskConfig { priority: 1, period: 1000, cpu_reserve: 0, offset: 80 });

    // 80 - 50 leaves 30, below the latency
    assert_eq!(h.pass(0).sleep_ticks, 49);
}

#[test]
fn idle_sleep_within_latency_is_kept() {
    let mut h = Harness::new(config(Discipline::FixedPriority));
    h.install_with(1, TaskConfig { priority: 1, period: 1000, cpu_reserve: 0, offset: 30 });

    // The dwell trim only applies to sleeps strictly longer than the wake
    // latency; 30 <= 50 is kept as is
    assert_eq!(h.pass(0).sleep_ticks, 30);
}

#[test]
fn finished_task_is_neither_charged_nor_advanced() {
    let mut h = Harness::new(config(Discipline::EarliestDeadline));
    let a = h.install(1, 2, 100, 20);

    assert_eq!(h.pass(0).task, a);
    h.task_mut(a).state = TaskState::Finished;

    for elapsed in [15, 200] {
        let dispatch = h.pass(elapsed);
        let tcb = h.task(a);
        assert_eq!(dispatch.task, TaskId::IDLE);
        assert_eq!(tcb.state, TaskState::Finished);
        assert_eq!(tcb.cpu_remaining, 20);
        assert_eq!(tcb.next_period, 100);
        assert_eq!(tcb.next_wakeup, 100);
    }
    assert!(h.log.iter().next().is_none());
}

#[test]
fn no_notification_when_selection_unchanged() {
    let mut h = Harness::new(config(Discipline::FixedPriority));
    let a = h.install(1, 3, 1000, 0);

    let first = h.pass(0);
    assert!(first.is_switch());
    assert_eq!(h.observer.switches, vec![(TaskId::IDLE, a)]);

    let second = h.pass(10);
    assert_eq!(second.task, a);
    assert!(!second.is_switch());
    assert_eq!(h.observer.switches.len(), 1);
    assert_eq!(h.task(a).stats.swapped_in, 1);
}

#[test]
fn nothing_pending_sleeps_for_the_global_bound() {
    let mut h = Harness::new(config(Discipline::FixedPriority).with_power_down(false));

    let dispatch = h.pass(0);

    assert_eq!(dispatch.task, TaskId::IDLE);
    assert!(NO_PENDING_WAKEUP > h.sched.config().max_wakeup);
    assert_eq!(dispatch.sleep_ticks, h.sched.config().max_wakeup);
}

#[test]
fn periodic_task_runs_once_per_period() {
    let mut h = Harness::new(config(Discipline::FixedPriority));
    let a = h.install(1, 2, 100, 10);

    assert_eq!(h.pass(0).task, a);
    let done = h.finish_job(4);
    assert_eq!(done.task, TaskId::IDLE);
    assert_eq!(h.task(a).state, TaskState::Suspended);
    // Suspended before the budget check, so the job is not charged
    assert_eq!(h.task(a).cpu_remaining, 10);
    // Woken exactly at its next release
    assert_eq!(h.task(a).next_wakeup, 96);

    let woken = h.pass(96);
    assert_eq!(woken.task, a);
    assert_eq!(h.task(a).cpu_remaining, 10);
    assert_eq!(h.task(a).stats.periods, 1);
    assert!(h.log.iter().next().is_none());
}

#[test]
fn higher_priority_release_preempts() {
    let mut h = Harness::new(config(Discipline::FixedPriority));
    let low = h.install(1, 1, 1000, 0);
    let high = h.install_with(2, TaskConfig { priority: 5, period: 200, cpu_reserve: 0, offset: 40 });

    let first = h.pass(0);
    assert_eq!(first.task, low);
    // The next decision lands on the release of the high-priority task
    assert_eq!(first.sleep_ticks, 40);

    let second = h.pass(40);
    assert_eq!(second.task, high);
    assert_eq!(second.previous, low);
    assert_eq!(h.sched.current_priority(), 5);
}

#[test]
fn budgeted_task_is_revisited_when_budget_runs_out() {
    let mut h = Harness::new(config(Discipline::FixedPriority));
    let a = h.install(1, 2, 500, 25);

    let dispatch = h.pass(0);
    assert_eq!(dispatch.task, a);
    assert_eq!(dispatch.sleep_ticks, 25);

    // Exhausted exactly: suspended, no violation
    let next = h.pass(25);
    assert_eq!(next.task, TaskId::IDLE);
    assert_eq!(h.task(a).state, TaskState::Suspended);
    assert_eq!(h.log.reserve_violations(), 0);
}

#[test]
fn earliest_deadline_prefers_nearest_period_end() {
    let mut h = Harness::new(config(Discipline::EarliestDeadline));
    let long = h.install(1, 9, 300, 0);
    let short = h.install(2, 1, 100, 0);

    assert_eq!(h.pass(0).task, short);

    // Equal deadlines: lowest slot wins, every time
    for _ in 0..3 {
        h.task_mut(long).next_period = 300;
        h.task_mut(short).next_period = 300;
        assert_eq!(h.pass(0).task, long);
    }
}

#[test]
fn earliest_deadline_ignores_ready_queue() {
    let mut h = Harness::new(config(Discipline::EarliestDeadline));
    let a = h.install(1, 1, 100, 0);

    assert!(h.sched.ready_queue().is_empty());
    assert_eq!(h.pass(0).task, a);
    h.finish_job(10);
    assert!(h.sched.ready_queue().is_empty());
    assert_eq!(h.sched.current(), TaskId::IDLE);
}

#[test]
fn event_suspended_task_is_not_woken_by_countdown() {
    let mut h = Harness::new(config(Discipline::FixedPriority));
    let a = h.install(1, 1, 50, 0);
    assert_eq!(h.pass(0).task, a);

    let tcb = h.task_mut(a);
    tcb.suspend_flag = true;
    tcb.event_suspend = 1;
    tcb.nw_flag = false;
    h.pass(5);
    assert_eq!(h.task(a).state, TaskState::EventSuspended);

    h.pass(60);
    assert_eq!(h.task(a).state, TaskState::EventSuspended);
    assert_eq!(h.sched.current(), TaskId::IDLE);
}

#[test]
fn clock_accumulates_elapsed_ticks() {
    let mut h = Harness::new(config(Discipline::FixedPriority));
    for _ in 0..3 {
        h.pass(400);
    }
    let now = h.sched.system_time();
    assert_eq!(now.secs, 1);
    assert_eq!(now.nano_secs, 200_000_000);
}

#[test]
fn late_pass_pushes_wakeup_into_the_future() {
    let mut h = Harness::new(config(Discipline::FixedPriority));
    h.install_with(1, TaskConfig { priority: 1, period: 100, cpu_reserve: 0, offset: 60 });

    h.sched.yield_now(0);
    h.timer.now = 59;
    let dispatch = h.sched.schedule(&mut h.timer, &mut h.log, &mut h.observer);

    assert_eq!(dispatch.sleep_ticks, 61);
    assert_eq!(h.sched.baseline(), 61);
    assert_eq!(h.timer.programmed.first(), Some(&1000));
    assert_eq!(h.timer.last_programmed(), Some(61));
    assert_eq!(h.sched.task(id(1)).map(|t| t.state), Some(TaskState::Suspended));
}
