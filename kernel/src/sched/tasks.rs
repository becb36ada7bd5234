//! Демо-задачи: видно, что вытеснение работает.
//! Demo tasks: make preemption visible on the serial console.

use libblip::config::TICK_HZ;
use libblip::Error;
use log::{debug, info};

/// Сколько тиков между сообщениями / Ticks between reports
const REPORT_EVERY: u64 = TICK_HZ as u64;

/// Крутится без `hlt`: сменить её может только таймер.
/// Spins without `hlt`: only the timer can take the CPU away.
fn busy_reporter(name: &str) -> ! {
    let mut next = super::ticks() + REPORT_EVERY;
    let mut spins: u64 = 0;
    loop {
        spins = spins.wrapping_add(1);
        let now = super::ticks();
        if now >= next {
            info!("{} ({}) still running at tick {}, {} spins", name, super::current(), now, spins);
            next = now + REPORT_EVERY;
        }
        core::hint::spin_loop();
    }
}

extern "C" fn ping() {
    busy_reporter("ping");
}

extern "C" fn pong() {
    busy_reporter("pong");
}

/// Возвращается сразу: попадает в return trap.
/// Returns at once and lands in the return trap.
extern "C" fn one_shot() {
    info!("one-shot task {} ran at tick {}", super::current(), super::ticks());
}

/// Заполнить таблицу; лишняя задача показывает отказ TableFull.
/// Fill the table; the extra task demonstrates the TableFull refusal.
pub fn spawn_demo_tasks() {
    for entry in [ping as extern "C" fn(), pong, one_shot, one_shot] {
        match super::spawn(entry) {
            Ok(_) => {}
            Err(Error::TableFull) => debug!("demo: table full as expected"),
            Err(err) if err.is_fatal() => panic!("demo task setup: {}", err),
            Err(_) => break,
        }
    }
}
