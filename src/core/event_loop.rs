use std::time::Duration;
use tokio::time::MissedTickBehavior;

/// Timer services of the coordinating thread.
pub trait EventLoop {
    /// Call `tick` every `interval` until it returns `false`.
    fn every(&self, interval: Duration, tick: Box<dyn FnMut() -> bool>);

    /// Call `task` once after `delay`.
    fn after(&self, delay: Duration, task: Box<dyn FnOnce()>);
}

/// Timers as local tasks; must be used from inside a `tokio::task::LocalSet`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalTokioLoop;

impl EventLoop for LocalTokioLoop {
    fn every(&self, interval: Duration, mut tick: Box<dyn FnMut() -> bool>) {
        tokio::task::spawn_local(async move {
            let mut timer = tokio::time::interval(interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the first tick completes immediately
            timer.tick().await;
            loop {
                timer.tick().await;
                if !tick() {
                    break;
                }
            }
        });
    }

    fn after(&self, delay: Duration, task: Box<dyn FnOnce()>) {
        tokio::task::spawn_local(async move {
            tokio::time::sleep(delay).await;
            task();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn recurring_timer_stops_when_told() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        let local = tokio::task::LocalSet::new();
        let ticks = Rc::new(Cell::new(0));

        let seen = ticks.clone();
        local.block_on(&rt, async move {
            LocalTokioLoop.every(
                Duration::from_millis(1),
                Box::new(move || {
                    seen.set(seen.get() + 1);
                    seen.get() < 3
                }),
            );
        });
        rt.block_on(local);

        assert_eq!(ticks.get(), 3);
    }

    #[test]
    fn one_shot_runs_once() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        let local = tokio::task::LocalSet::new();
        let ran = Rc::new(Cell::new(0));

        let seen = ran.clone();
        local.block_on(&rt, async move {
            LocalTokioLoop.after(Duration::from_millis(1), Box::new(move || seen.set(seen.get() + 1)));
        });
        rt.block_on(local);

        assert_eq!(ran.get(), 1);
    }
}
