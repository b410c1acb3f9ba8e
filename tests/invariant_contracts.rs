//! Contract tests: verify the delay-balancing invariants are actually
//! enforced on the code paths that rebalance delays.
//!
//! Uses the invariant_ppt framework: production code logs every invariant it
//! checks, and `contract_test` fails if a required invariant was never
//! exercised in this thread.

use crabclock::invariant_ppt::{clear_invariant_log, contract_test};
use crabclock::{MainClock, Tick};

#[test]
fn contract_master_set_delay_checks_delay_balance() {
    clear_invariant_log();

    let main = MainClock::new();
    let master = main.create_master("audio/0", None);
    master.lock().set_delay(Tick::from_millis(100));
    master.lock().set_delay(Tick::from_millis(40));

    contract_test(
        "master set_delay",
        &[
            "master-side delay must never be positive",
            "track delay must never be negative",
        ],
    );
}

#[test]
fn contract_master_reset_checks_delay_balance() {
    clear_invariant_log();

    let main = MainClock::new();
    let master = main.create_master("audio/0", None);
    master.lock().reset();

    contract_test(
        "master reset",
        &[
            "master-side delay must never be positive",
            "track delay must never be negative",
        ],
    );
}

#[test]
fn contract_session_enforces_single_master() {
    clear_invariant_log();

    let main = MainClock::new();
    let master = main.create_master("audio/0", None);
    drop(master);

    contract_test(
        "master creation",
        &["at most one master clock per session"],
    );
}
