// This file is part of adlinkd, a daemon which monitors the data link between an FPGA-based acquisition card and its host and rebinds it when packet synchronisation is lost.
//
// Copyright 2025 Canonical Ltd.
//
// SPDX-License-Identifier: GPL-3.0-only
//
// adlinkd is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License version 3, as published by the Free Software Foundation.
//
// adlinkd is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranties of MERCHANTABILITY, SATISFACTORY QUALITY, or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with this program.  If not, see http://www.gnu.org/licenses/.

//! Recovery state machine for the acquisition card's data link.
//!
//! The monitor watches the Aurora channel/lane status registers and, when the
//! card loses packet binding, drives the recovery sequence: strobe the
//! datapath resets, wait for data activity to return, ask the peer
//! application to rebond the ASIC, and wait for the link to confirm it is
//! fully bound again.
//!
//! The machine is a closed enum of states with an explicit transition
//! function; every [`LinkMonitor::step`] call runs the current state's entry
//! action, which yields an [`Event`], and applies the transition that event
//! names. The supervising task in [`crate::task`] invokes `step` at a fixed
//! cadence; the monitor owns no thread and no locks of its own.
//!
//! Timeouts inside the two waiting states are not failures. A silent link
//! after a reset goes quietly back to [`BindState::Monitoring`] (a card with
//! nothing to send would otherwise be reset over and over), while a rebond
//! that does not confirm within its window restarts the reset cycle.

use crate::channel::StatusChannel;
use crate::comm::ParameterClient;
use crate::config::MonitorConfig;
use crate::error::AdlinkError;
use log::{debug, info, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Period between polls inside the waiting states, and the granularity at
/// which a cleared enabled flag is observed.
const POLL_PERIOD: Duration = Duration::from_secs(1);

/// States of the link recovery machine. Exactly one is active at any time
/// and [`transition`] is the only way it changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindState {
    /// Idle supervision of a (presumed) bound link.
    Monitoring,
    /// Strobing the datapath reset fields.
    Resetting,
    /// Waiting for any post-reset data activity, bounded by `bind_timeout`.
    WaitingForValues,
    /// Sending the rebond command to the peer application.
    Rebinding,
    /// Waiting for fully-bound confirmation, bounded by `rebind_timeout`.
    WaitingForBind,
}

/// Named transition events produced by state entry actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// Binding lost while monitoring.
    Reset,
    /// Reset pulses issued, start watching for activity.
    StartWait,
    /// Data activity seen, attempt a rebond.
    TryBind,
    /// Rebond command sent, wait for confirmation.
    WaitBind,
    /// Return to idle monitoring.
    Monitor,
    /// Rebond window elapsed, run a fresh reset cycle.
    RestartReset,
    /// Link still bound, stay in monitoring.
    Loop,
}

/// The transition table of the machine. Events a state cannot produce leave
/// the machine where it is.
pub(crate) fn transition(state: BindState, event: Event) -> BindState {
    match (state, event) {
        (BindState::Monitoring, Event::Loop) => BindState::Monitoring,
        (BindState::Monitoring, Event::Reset) => BindState::Resetting,
        (BindState::Resetting, Event::StartWait) => BindState::WaitingForValues,
        (BindState::WaitingForValues, Event::TryBind) => BindState::Rebinding,
        (BindState::WaitingForValues, Event::Monitor) => BindState::Monitoring,
        (BindState::Rebinding, Event::WaitBind) => BindState::WaitingForBind,
        (BindState::WaitingForBind, Event::Monitor) => BindState::Monitoring,
        (BindState::WaitingForBind, Event::RestartReset) => BindState::Resetting,
        (state, event) => {
            warn!("link monitor: ignoring {event:?} in state {state:?}");
            state
        }
    }
}

/// Long-lived monitor for one card/host data link.
///
/// Constructed once next to the task that owns it and driven for the life of
/// the process; the `enabled` flag is its only cancellation input and is
/// written solely by the shutdown path.
pub struct LinkMonitor<P: ParameterClient> {
    channel: StatusChannel<P>,
    config: MonitorConfig,
    enabled: Arc<AtomicBool>,
    state: BindState,
}

impl<P: ParameterClient> LinkMonitor<P> {
    /// Build a monitor in the initial [`BindState::Monitoring`] state.
    ///
    /// # Returns: `Result<LinkMonitor<P>, AdlinkError>`
    /// * `Ok(LinkMonitor)` - Ready to be driven by the supervising task
    /// * `Err(AdlinkError::Config)` - Configuration failed validation
    pub fn new(
        channel: StatusChannel<P>,
        config: MonitorConfig,
        enabled: Arc<AtomicBool>,
    ) -> Result<Self, AdlinkError> {
        config.validate()?;
        Ok(LinkMonitor {
            channel,
            config,
            enabled,
            state: BindState::Monitoring,
        })
    }

    /// The currently active state.
    pub fn state(&self) -> BindState {
        self.state
    }

    /// Whether the owning task still wants the monitor running.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Run one step of the machine: the current state's entry action, then
    /// the transition its event names.
    ///
    /// A channel failure propagates out before any transition is applied, so
    /// the machine stays in its current state and the next invocation retries
    /// from there.
    pub async fn step(&mut self) -> Result<(), AdlinkError> {
        let event = match self.state {
            BindState::Monitoring => self.check_binding().await?,
            BindState::Resetting => self.issue_resets().await?,
            BindState::WaitingForValues => self.await_activity().await?,
            BindState::Rebinding => self.request_rebond().await?,
            BindState::WaitingForBind => self.await_binding().await?,
        };
        let next = transition(self.state, event);
        if next != self.state {
            debug!("link monitor: {:?} --{event:?}--> {next:?}", self.state);
        }
        self.state = next;
        Ok(())
    }

    /// Monitoring entry action: compare both status fields against the full
    /// bound mask, resetting on any mismatch.
    async fn check_binding(&self) -> Result<Event, AdlinkError> {
        let status = self.channel.read_status().await?;
        if status.is_bound(self.config.bound_mask) {
            info!("data link bound to acquisition packets");
            self.idle(self.config.check_interval).await;
            Ok(Event::Loop)
        } else {
            info!(
                "lost packet binding (chan_up={:#x} lane_up={:#x}), triggering reset",
                status.chan_up, status.lane_up
            );
            Ok(Event::Reset)
        }
    }

    /// Resetting entry action: strobe the datapath reset fields.
    async fn issue_resets(&self) -> Result<Event, AdlinkError> {
        self.channel.pulse_resets().await?;
        Ok(Event::StartWait)
    }

    /// WaitingForValues entry action: poll for any data activity within the
    /// bind window. A silent window is not escalated; the machine returns to
    /// idle monitoring rather than resetting a card that may have nothing to
    /// send yet.
    async fn await_activity(&self) -> Result<Event, AdlinkError> {
        let started = Instant::now();
        while started.elapsed() < self.config.bind_timeout && self.is_enabled() {
            let status = self.channel.read_status().await?;
            debug!(
                "chan_up={:#x} | lane_up={:#x}",
                status.chan_up, status.lane_up
            );
            if status.has_activity() {
                debug!("link channels receiving data, attempting rebind");
                return Ok(Event::TryBind);
            }
            self.idle(POLL_PERIOD).await;
        }
        warn!(
            "no activity on link channels within {:?}, returning to monitoring",
            self.config.bind_timeout
        );
        Ok(Event::Monitor)
    }

    /// Rebinding entry action: one rebond command to the peer application.
    async fn request_rebond(&self) -> Result<Event, AdlinkError> {
        self.channel.send_rebond().await?;
        info!("ASIC rebond command sent, waiting for binding to complete");
        Ok(Event::WaitBind)
    }

    /// WaitingForBind entry action: poll for fully-bound confirmation within
    /// the rebind window; an unconfirmed rebond restarts the reset cycle.
    async fn await_binding(&self) -> Result<Event, AdlinkError> {
        let started = Instant::now();
        while started.elapsed() < self.config.rebind_timeout && self.is_enabled() {
            let status = self.channel.read_status().await?;
            if status.is_bound(self.config.bound_mask) {
                info!("data link successfully bound after rebond");
                return Ok(Event::Monitor);
            }
            self.idle(POLL_PERIOD).await;
        }
        warn!(
            "rebond not confirmed within {:?}, restarting reset cycle",
            self.config.rebind_timeout
        );
        Ok(Event::RestartReset)
    }

    /// Sleep in slices of at most [`POLL_PERIOD`] so a cleared enabled flag
    /// is observed within one period rather than at the end of the wait.
    async fn idle(&self, total: Duration) {
        let mut remaining = total;
        while remaining > Duration::ZERO && self.is_enabled() {
            let slice = remaining.min(POLL_PERIOD);
            tokio::time::sleep(slice).await;
            remaining -= slice;
        }
    }

    #[cfg(test)]
    pub(crate) fn force_state(&mut self, state: BindState) {
        self.state = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config;
    use googletest::prelude::*;
    use rstest::rstest;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Client serving a script of (chan_up, lane_up) readings, one per status
    /// read, holding the last reading once the script runs out. Every write
    /// is recorded; reads can be made to fail.
    #[derive(Default)]
    struct ScriptedClient {
        statuses: Mutex<VecDeque<(u32, u32)>>,
        last: Mutex<(u32, u32)>,
        writes: Mutex<Vec<(String, String, String)>>,
        fail_reads: bool,
    }

    impl ScriptedClient {
        fn with_script(script: &[(u32, u32)]) -> Self {
            ScriptedClient {
                statuses: Mutex::new(script.iter().copied().collect()),
                ..ScriptedClient::default()
            }
        }
    }

    impl ParameterClient for ScriptedClient {
        async fn read_field(&self, _path: &str, field: &str) -> Result<String, AdlinkError> {
            if self.fail_reads {
                return Err(AdlinkError::Channel(zbus::Error::InvalidReply));
            }
            // The channel reads chan_up first; advance the script then.
            if field == config::CHAN_UP_FIELD {
                if let Some(next) = self.statuses.lock().unwrap().pop_front() {
                    *self.last.lock().unwrap() = next;
                }
            }
            let (chan, lane) = *self.last.lock().unwrap();
            if field == config::CHAN_UP_FIELD {
                Ok(format!("{chan:#x}"))
            } else {
                Ok(lane.to_string())
            }
        }

        async fn write_field(
            &self,
            path: &str,
            field: &str,
            value: &str,
        ) -> Result<(), AdlinkError> {
            self.writes.lock().unwrap().push((
                path.to_string(),
                field.to_string(),
                value.to_string(),
            ));
            Ok(())
        }
    }

    fn test_config() -> MonitorConfig {
        MonitorConfig {
            check_interval: Duration::from_secs(2),
            bind_timeout: Duration::from_secs(5),
            rebind_timeout: Duration::from_secs(5),
            ..MonitorConfig::default()
        }
    }

    fn monitor_with(
        client: ScriptedClient,
        config: MonitorConfig,
    ) -> (LinkMonitor<ScriptedClient>, Arc<AtomicBool>) {
        let enabled = Arc::new(AtomicBool::new(true));
        let channel = StatusChannel::new(client, &config);
        let monitor = LinkMonitor::new(channel, config, enabled.clone()).unwrap();
        (monitor, enabled)
    }

    fn recorded_writes(monitor: &LinkMonitor<ScriptedClient>) -> Vec<(String, String, String)> {
        monitor.channel.client().writes.lock().unwrap().clone()
    }

    fn expected_pulse_writes() -> Vec<(String, String, String)> {
        ["aurora_reset", "data_path_reset", "cmac_0_reset"]
            .iter()
            .flat_map(|field| {
                ["1", "0"].iter().map(move |value| {
                    (
                        config::CONTROL_FIELDS_PATH.to_string(),
                        field.to_string(),
                        value.to_string(),
                    )
                })
            })
            .collect()
    }

    #[rstest]
    #[case::bound_self_loop(BindState::Monitoring, Event::Loop, BindState::Monitoring)]
    #[case::binding_lost(BindState::Monitoring, Event::Reset, BindState::Resetting)]
    #[case::resets_issued(BindState::Resetting, Event::StartWait, BindState::WaitingForValues)]
    #[case::activity_seen(BindState::WaitingForValues, Event::TryBind, BindState::Rebinding)]
    #[case::bind_window_elapsed(BindState::WaitingForValues, Event::Monitor, BindState::Monitoring)]
    #[case::rebond_sent(BindState::Rebinding, Event::WaitBind, BindState::WaitingForBind)]
    #[case::rebond_confirmed(BindState::WaitingForBind, Event::Monitor, BindState::Monitoring)]
    #[case::rebond_window_elapsed(
        BindState::WaitingForBind,
        Event::RestartReset,
        BindState::Resetting
    )]
    fn transition_table(#[case] from: BindState, #[case] event: Event, #[case] to: BindState) {
        assert_eq!(transition(from, event), to);
    }

    #[rstest]
    #[case::foreign_event(BindState::Resetting, Event::TryBind)]
    #[case::stale_loop(BindState::Rebinding, Event::Loop)]
    fn transition_ignores_events_a_state_cannot_produce(
        #[case] from: BindState,
        #[case] event: Event,
    ) {
        assert_eq!(transition(from, event), from);
    }

    #[gtest]
    #[tokio::test(start_paused = true)]
    async fn bound_link_self_loops_without_writes() {
        let client = ScriptedClient::with_script(&[(config::BOUND_MASK, config::BOUND_MASK)]);
        let (mut monitor, _enabled) = monitor_with(client, test_config());

        monitor.step().await.unwrap();
        monitor.step().await.unwrap();

        assert_eq!(monitor.state(), BindState::Monitoring);
        assert!(recorded_writes(&monitor).is_empty());
    }

    #[gtest]
    #[tokio::test(start_paused = true)]
    async fn partial_binding_triggers_reset() {
        let client = ScriptedClient::with_script(&[(config::BOUND_MASK, 0x3)]);
        let (mut monitor, _enabled) = monitor_with(client, test_config());

        monitor.step().await.unwrap();

        assert_eq!(monitor.state(), BindState::Resetting);
    }

    #[gtest]
    #[tokio::test(start_paused = true)]
    async fn resetting_pulses_fields_in_order_then_waits() {
        let client = ScriptedClient::default();
        let (mut monitor, _enabled) = monitor_with(client, test_config());
        monitor.force_state(BindState::Resetting);

        monitor.step().await.unwrap();

        assert_eq!(monitor.state(), BindState::WaitingForValues);
        assert_eq!(recorded_writes(&monitor), expected_pulse_writes());
    }

    #[gtest]
    #[tokio::test(start_paused = true)]
    async fn activity_triggers_rebind_on_that_poll() {
        // Silent for two polls, then one lane shows traffic.
        let client = ScriptedClient::with_script(&[(0, 0), (0, 0), (0, 0x5)]);
        let (mut monitor, _enabled) = monitor_with(client, test_config());
        monitor.force_state(BindState::WaitingForValues);

        monitor.step().await.unwrap();

        assert_eq!(monitor.state(), BindState::Rebinding);
        assert!(monitor.channel.client().statuses.lock().unwrap().is_empty());
    }

    #[gtest]
    #[tokio::test(start_paused = true)]
    async fn silent_bind_window_returns_to_monitoring() {
        let client = ScriptedClient::default();
        let (mut monitor, _enabled) = monitor_with(client, test_config());
        monitor.force_state(BindState::WaitingForValues);

        monitor.step().await.unwrap();

        // Quietly back to idle, not a fresh reset.
        assert_eq!(monitor.state(), BindState::Monitoring);
        assert!(recorded_writes(&monitor).is_empty());
    }

    #[gtest]
    #[tokio::test(start_paused = true)]
    async fn rebinding_sends_exactly_one_peer_command() {
        let client = ScriptedClient::default();
        let (mut monitor, _enabled) = monitor_with(client, test_config());
        monitor.force_state(BindState::Rebinding);

        monitor.step().await.unwrap();

        assert_eq!(monitor.state(), BindState::WaitingForBind);
        assert_eq!(
            recorded_writes(&monitor),
            vec![(
                config::PEER_SYSTEM_STATE_PATH.to_string(),
                "ASIC_REBOND".to_string(),
                "true".to_string(),
            )]
        );
    }

    #[gtest]
    #[tokio::test(start_paused = true)]
    async fn confirmed_rebond_returns_to_monitoring() {
        let client = ScriptedClient::with_script(&[
            (0x5, 0x5),
            (config::BOUND_MASK, config::BOUND_MASK),
        ]);
        let (mut monitor, _enabled) = monitor_with(client, test_config());
        monitor.force_state(BindState::WaitingForBind);

        monitor.step().await.unwrap();

        assert_eq!(monitor.state(), BindState::Monitoring);
    }

    #[gtest]
    #[tokio::test(start_paused = true)]
    async fn unconfirmed_rebond_restarts_reset_cycle() {
        let client = ScriptedClient::with_script(&[(0x5, 0x5)]);
        let (mut monitor, _enabled) = monitor_with(client, test_config());
        monitor.force_state(BindState::WaitingForBind);

        monitor.step().await.unwrap();

        assert_eq!(monitor.state(), BindState::Resetting);
    }

    #[gtest]
    #[tokio::test(start_paused = true)]
    async fn cleared_flag_exits_wait_within_one_poll_period() {
        let client = ScriptedClient::default();
        let mut config = test_config();
        config.bind_timeout = Duration::from_secs(3600);
        let (mut monitor, enabled) = monitor_with(client, config);
        monitor.force_state(BindState::WaitingForValues);

        let before = Instant::now();
        let flag = enabled.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            flag.store(false, Ordering::SeqCst);
        });

        monitor.step().await.unwrap();

        // Timeout-path transition, observed within one poll period of the
        // flag clearing rather than after the hour-long window.
        assert_eq!(monitor.state(), BindState::Monitoring);
        assert!(before.elapsed() <= Duration::from_secs(4));
    }

    #[gtest]
    #[tokio::test(start_paused = true)]
    async fn channel_failure_leaves_state_untouched() {
        let client = ScriptedClient {
            fail_reads: true,
            ..ScriptedClient::default()
        };
        let (mut monitor, _enabled) = monitor_with(client, test_config());

        let result = monitor.step().await;

        assert_that!(
            result,
            err(displays_as(contains_substring("AdlinkError::Channel:")))
        );
        assert_eq!(monitor.state(), BindState::Monitoring);
    }

    #[gtest]
    #[tokio::test(start_paused = true)]
    async fn full_recovery_sequence_end_to_end() {
        let client = ScriptedClient::with_script(&[
            (0, 0),                                   // monitoring: binding lost
            (0, 0),                                   // first post-reset poll: silent
            (0x5, 0),                                 // second poll: activity
            (config::BOUND_MASK, config::BOUND_MASK), // rebond confirmed
        ]);
        let (mut monitor, _enabled) = monitor_with(client, test_config());

        monitor.step().await.unwrap();
        assert_eq!(monitor.state(), BindState::Resetting);

        monitor.step().await.unwrap();
        assert_eq!(monitor.state(), BindState::WaitingForValues);
        assert_eq!(recorded_writes(&monitor), expected_pulse_writes());

        monitor.step().await.unwrap();
        assert_eq!(monitor.state(), BindState::Rebinding);

        monitor.step().await.unwrap();
        assert_eq!(monitor.state(), BindState::WaitingForBind);

        monitor.step().await.unwrap();
        assert_eq!(monitor.state(), BindState::Monitoring);

        // Six pulse writes plus the single rebond command, nothing after.
        let mut expected = expected_pulse_writes();
        expected.push((
            config::PEER_SYSTEM_STATE_PATH.to_string(),
            "ASIC_REBOND".to_string(),
            "true".to_string(),
        ));
        assert_eq!(recorded_writes(&monitor), expected);
    }
}
