// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Ember Systems Inc.

//! Watchdog loop detection
//!
//! Counts consecutive watchdog/panic resets in firmware variables. When
//! more than the allowed number land inside a ten-minute window, the user
//! gets the crash-event menu instead of another silent boot loop.
//!
//! The RTC is not trusted: a reference time in the future (backwards
//! clock) restarts the window. Variable store failures degrade to a
//! normal boot; the detector is a convenience, not a trust gate.

use ember_common::WallTime;

use crate::env::{BuildVariant, Platform, RebootReason, VarStore};
use crate::vars;

/// Watchdog escalation window
pub const WATCHDOG_WINDOW_SECS: u64 = 10 * 60;

/// Outcome of the crash-loop check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrashLoopVerdict {
    /// Not in a crash loop; continue the normal selection chain
    Normal,
    /// The previous OS instance asked for a shutdown; honor it
    PowerOff,
    /// Loop threshold exceeded; show the crash-event menu
    Escalate,
}

/// Run the crash-loop detector for this boot
pub fn check_crash_loop(
    vars: &mut dyn VarStore,
    platform: &mut dyn Platform,
    build: BuildVariant,
) -> CrashLoopVerdict {
    if !vars::crash_event_menu(&*vars) {
        return CrashLoopVerdict::Normal;
    }

    let (counter, time_ref) = vars::watchdog_status(&*vars);

    if !reset_is_watchdog_or_panic(platform) {
        if counter != 0 {
            let _ = vars::reset_watchdog_status(vars);
        }
        return CrashLoopVerdict::Normal;
    }

    // A watchdog reset during an OS-requested shutdown is the shutdown
    // hanging, not a crash loop
    if build == BuildVariant::Production
        && platform.reboot_reason() == Some(RebootReason::Shutdown)
    {
        platform.clear_reboot_reason();
        return CrashLoopVerdict::PowerOff;
    }

    let now = platform.now();
    let mut counter = counter;

    if counter > 0 {
        let in_window = time_ref
            .and_then(|r| now.checked_since(WallTime::from_secs(r)))
            .is_some_and(|elapsed| elapsed <= WATCHDOG_WINDOW_SECS);
        if !in_window {
            counter = 0;
        }
    }

    if counter == 0 && vars::set_watchdog_time_ref(vars, now.as_secs()).is_err() {
        return CrashLoopVerdict::Normal;
    }

    counter += 1;

    if counter <= vars::watchdog_counter_max(&*vars) {
        let _ = vars::set_watchdog_counter(vars, counter);
        return CrashLoopVerdict::Normal;
    }

    let _ = vars::reset_watchdog_status(vars);
    CrashLoopVerdict::Escalate
}

fn reset_is_watchdog_or_panic(platform: &dyn Platform) -> bool {
    platform.reset_source().is_watchdog()
        || matches!(
            platform.reboot_reason(),
            Some(RebootReason::KernelPanic | RebootReason::Watchdog)
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{ResetSource, VarScope, WakeSource};
    use alloc::collections::BTreeMap;
    use alloc::string::{String, ToString};
    use alloc::vec::Vec;
    use ember_common::{Error, Millis, Result};

    #[derive(Default)]
    struct MemVars(BTreeMap<String, Vec<u8>>);

    impl VarStore for MemVars {
        fn get_var(&self, _scope: VarScope, name: &str) -> Result<Vec<u8>> {
            self.0.get(name).cloned().ok_or(Error::VariableNotFound)
        }

        fn set_var(&mut self, _scope: VarScope, name: &str, value: &[u8]) -> Result<()> {
            self.0.insert(name.to_string(), value.to_vec());
            Ok(())
        }

        fn delete_var(&mut self, _scope: VarScope, name: &str) -> Result<()> {
            self.0.remove(name);
            Ok(())
        }
    }

    struct FakePlatform {
        reset: ResetSource,
        reason: Option<RebootReason>,
        now_secs: u64,
    }

    impl Platform for FakePlatform {
        fn wake_source(&self) -> WakeSource {
            WakeSource::Unknown
        }
        fn reset_source(&self) -> ResetSource {
            self.reset
        }
        fn reboot_reason(&self) -> Option<RebootReason> {
            self.reason
        }
        fn clear_reboot_reason(&mut self) {
            self.reason = None;
        }
        fn battery_below_boot_threshold(&self) -> bool {
            false
        }
        fn charger_plugged(&self) -> bool {
            false
        }
        fn now(&self) -> WallTime {
            WallTime::from_secs(self.now_secs)
        }
        fn uptime_ms(&self) -> u64 {
            0
        }
        fn stall(&mut self, _duration: Millis) {}
    }

    fn watchdog_platform(now_secs: u64) -> FakePlatform {
        FakePlatform {
            reset: ResetSource::KernelWatchdog,
            reason: None,
            now_secs,
        }
    }

    #[test]
    fn clean_reset_clears_state() {
        let mut vars = MemVars::default();
        vars::set_watchdog_counter(&mut vars, 2).unwrap();
        vars::set_watchdog_time_ref(&mut vars, 100).unwrap();

        let mut platform = FakePlatform {
            reset: ResetSource::NotApplicable,
            reason: None,
            now_secs: 200,
        };
        assert_eq!(
            check_crash_loop(&mut vars, &mut platform, BuildVariant::Production),
            CrashLoopVerdict::Normal
        );
        assert_eq!(vars::watchdog_status(&vars), (0, None));
    }

    #[test]
    fn escalates_past_threshold_within_window() {
        let mut vars = MemVars::default();
        // Default threshold is 2: two watchdog resets increment, the
        // third escalates
        for boot in 0..2 {
            let mut platform = watchdog_platform(1000 + boot * 30);
            assert_eq!(
                check_crash_loop(&mut vars, &mut platform, BuildVariant::Production),
                CrashLoopVerdict::Normal
            );
        }
        let mut platform = watchdog_platform(1090);
        assert_eq!(
            check_crash_loop(&mut vars, &mut platform, BuildVariant::Production),
            CrashLoopVerdict::Escalate
        );
        // State cleared after escalation
        assert_eq!(vars::watchdog_status(&vars), (0, None));
    }

    #[test]
    fn boundary_at_exact_threshold() {
        let mut vars = MemVars::default();
        vars.set_var(VarScope::Device, vars::WATCHDOG_COUNTER_MAX_VAR, &[4])
            .unwrap();

        for boot in 0..4 {
            let mut platform = watchdog_platform(1000 + boot);
            assert_eq!(
                check_crash_loop(&mut vars, &mut platform, BuildVariant::Production),
                CrashLoopVerdict::Normal,
                "reset {boot} must not escalate yet"
            );
        }
        let mut platform = watchdog_platform(1010);
        assert_eq!(
            check_crash_loop(&mut vars, &mut platform, BuildVariant::Production),
            CrashLoopVerdict::Escalate
        );
    }

    #[test]
    fn window_expiry_restarts_count() {
        let mut vars = MemVars::default();
        let mut platform = watchdog_platform(1000);
        check_crash_loop(&mut vars, &mut platform, BuildVariant::Production);
        check_crash_loop(&mut vars, &mut watchdog_platform(1001), BuildVariant::Production);

        // Just past the window: counter restarts at 1 instead of escalating
        let mut late = watchdog_platform(1000 + WATCHDOG_WINDOW_SECS + 1);
        assert_eq!(
            check_crash_loop(&mut vars, &mut late, BuildVariant::Production),
            CrashLoopVerdict::Normal
        );
        assert_eq!(vars::watchdog_status(&vars).0, 1);
    }

    #[test]
    fn window_boundary_inclusive() {
        let mut vars = MemVars::default();
        check_crash_loop(&mut vars, &mut watchdog_platform(1000), BuildVariant::Production);
        check_crash_loop(&mut vars, &mut watchdog_platform(1001), BuildVariant::Production);

        // Exactly at the window edge still counts toward the loop
        let mut edge = watchdog_platform(1000 + WATCHDOG_WINDOW_SECS);
        assert_eq!(
            check_crash_loop(&mut vars, &mut edge, BuildVariant::Production),
            CrashLoopVerdict::Escalate
        );
    }

    #[test]
    fn backwards_clock_restarts_count() {
        let mut vars = MemVars::default();
        check_crash_loop(&mut vars, &mut watchdog_platform(5000), BuildVariant::Production);
        check_crash_loop(&mut vars, &mut watchdog_platform(5001), BuildVariant::Production);

        let mut past = watchdog_platform(100);
        assert_eq!(
            check_crash_loop(&mut vars, &mut past, BuildVariant::Production),
            CrashLoopVerdict::Normal
        );
        assert_eq!(vars::watchdog_status(&vars).0, 1);
    }

    #[test]
    fn production_shutdown_reason_powers_off() {
        let mut vars = MemVars::default();
        let mut platform = FakePlatform {
            reset: ResetSource::KernelWatchdog,
            reason: Some(RebootReason::Shutdown),
            now_secs: 1000,
        };
        assert_eq!(
            check_crash_loop(&mut vars, &mut platform, BuildVariant::Production),
            CrashLoopVerdict::PowerOff
        );
        assert_eq!(platform.reason, None);

        // Engineering builds keep counting instead
        let mut platform = FakePlatform {
            reset: ResetSource::KernelWatchdog,
            reason: Some(RebootReason::Shutdown),
            now_secs: 1000,
        };
        assert_eq!(
            check_crash_loop(&mut vars, &mut platform, BuildVariant::Engineering),
            CrashLoopVerdict::Normal
        );
    }

    #[test]
    fn panic_reason_counts_as_watchdog() {
        let mut vars = MemVars::default();
        let mut platform = FakePlatform {
            reset: ResetSource::NotApplicable,
            reason: Some(RebootReason::KernelPanic),
            now_secs: 1000,
        };
        check_crash_loop(&mut vars, &mut platform, BuildVariant::Production);
        assert_eq!(vars::watchdog_status(&vars).0, 1);
    }

    #[test]
    fn menu_disabled_skips_detection() {
        let mut vars = MemVars::default();
        vars.set_var(VarScope::Device, vars::CRASH_EVENT_MENU_VAR, &[0])
            .unwrap();
        let mut platform = watchdog_platform(1000);
        assert_eq!(
            check_crash_loop(&mut vars, &mut platform, BuildVariant::Production),
            CrashLoopVerdict::Normal
        );
        assert_eq!(vars::watchdog_status(&vars), (0, None));
    }
}
