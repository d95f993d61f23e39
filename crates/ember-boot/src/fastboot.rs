// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Ember Systems Inc.

//! Fastboot session state machine
//!
//! The USB protocol lives outside the core; the [`FastbootTransport`]
//! trait delivers one event per serviced command batch. This module
//! classifies events into session steps; `flow` executes them. Terminal
//! transitions are reboot, chainload, handoff and die. One iteration
//! never leaks state into the next beyond the `BootState` variable.

use alloc::vec::Vec;

use crate::target::BootTarget;

/// One event out of the fastboot service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FastbootEvent {
    /// `fastboot boot`: an image was downloaded into RAM
    BootImage(Vec<u8>),
    /// An EFI binary was downloaded for chainloading
    EfiImage(Vec<u8>),
    /// A command selected the next boot target (`reboot`, `continue`)
    Target(BootTarget),
    /// The transport died
    Closed,
}

/// Fastboot protocol service
pub trait FastbootTransport {
    /// Service commands until an event is produced
    fn next_event(&mut self) -> FastbootEvent;
}

/// What the session loop must do with an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStep {
    /// Verify and hand off a RAM image
    RamBoot(Vec<u8>),
    /// Start a downloaded EFI binary
    Chainload(Vec<u8>),
    /// Offer the crashmode menu, with a fast path back into fastboot
    PromptCrashmode,
    /// Leave the session and reboot to the target
    Reboot(BootTarget),
    /// Service the next event
    Continue,
    /// Transport is gone; halt after the UX pause
    Die,
}

/// Classify a transport event
///
/// RAM boots are only honored on unlocked devices; on a locked device
/// the downloaded image is dropped and the session continues.
#[must_use]
pub fn classify_event(event: FastbootEvent, device_unlocked: bool) -> SessionStep {
    match event {
        FastbootEvent::BootImage(image) => {
            if device_unlocked {
                SessionStep::RamBoot(image)
            } else {
                SessionStep::Continue
            }
        }
        FastbootEvent::EfiImage(image) => SessionStep::Chainload(image),
        FastbootEvent::Target(BootTarget::Crashmode) => SessionStep::PromptCrashmode,
        FastbootEvent::Target(BootTarget::UnknownTarget) => SessionStep::Continue,
        FastbootEvent::Target(target) => SessionStep::Reboot(target),
        FastbootEvent::Closed => SessionStep::Die,
    }
}
