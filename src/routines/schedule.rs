//! Expansion of recurring regimens into concrete doses

use std::collections::HashMap;

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_derive::{Deserialize, Serialize};

use crate::error::{HrtError, Result};
use crate::routines::settings::ScheduleSettings;
use crate::simulator::days_to_duration;
use crate::structs::dose::{Dose, DoseOrigin};
use crate::structs::model::ModelKey;
use crate::structs::reference::CYCLE_DAYS;
use crate::structs::regimen::{RegimenDefinition, TrackingMode};

/// Bounds of an expansion, with the query instant injected by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    now: DateTime<Utc>,
}

impl ScheduleWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>, now: DateTime<Utc>) -> Result<Self> {
        if end < start {
            return Err(HrtError::InvalidWindow { start, end });
        }
        Ok(ScheduleWindow { start, end, now })
    }

    /// The default window for a regimen in `mode`: back-filled when enabled,
    /// projected `horizon_days` ahead.
    pub fn around(now: DateTime<Utc>, settings: &ScheduleSettings, mode: TrackingMode) -> Self {
        let start = if settings.backfill && mode.is_scheduled() {
            now - days_to_duration(settings.lookback_days.max(0.0))
        } else {
            now
        };
        ScheduleWindow {
            start,
            end: now + days_to_duration(settings.horizon_days.max(0.0)),
            now,
        }
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }
    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }
}

/// A finite, restartable sequence of scheduled doses. Iterating does not consume it.
#[derive(Debug, Clone, PartialEq)]
pub struct Schedule {
    model: ModelKey,
    amount: f64,
    first: DateTime<Utc>,
    interval_ms: i64,
    end: DateTime<Utc>,
    empty: bool,
}

impl Schedule {
    fn empty(regimen: &RegimenDefinition, window: &ScheduleWindow) -> Self {
        Schedule {
            model: regimen.model(),
            amount: regimen.amount(),
            first: window.end,
            interval_ms: 1,
            end: window.end,
            empty: true,
        }
    }

    pub fn iter(&self) -> ScheduleIter {
        ScheduleIter {
            schedule: self.clone(),
            next: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.empty || self.first > self.end
    }

    /// The first dose of the sequence, at or before both the window start and now.
    pub fn first(&self) -> Option<DateTime<Utc>> {
        (!self.is_empty()).then_some(self.first)
    }

    pub fn doses(&self) -> Vec<Dose> {
        self.iter().collect()
    }
}

impl<'a> IntoIterator for &'a Schedule {
    type Item = Dose;
    type IntoIter = ScheduleIter;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[derive(Debug, Clone)]
pub struct ScheduleIter {
    schedule: Schedule,
    next: i64,
}

impl Iterator for ScheduleIter {
    type Item = Dose;

    fn next(&mut self) -> Option<Dose> {
        let s = &self.schedule;
        if s.empty {
            return None;
        }
        let offset = self.next.checked_mul(s.interval_ms)?;
        let at = s.first.checked_add_signed(Duration::milliseconds(offset))?;
        if at > s.end {
            return None;
        }
        self.next += 1;
        Some(Dose::scheduled(s.model, s.amount, at))
    }
}

/// The regimen's time of day on the latest day where it is not after `now`,
/// moved back to the matching cycle day when a phase is set.
fn anchor(regimen: &RegimenDefinition, now: DateTime<Utc>) -> DateTime<Utc> {
    let naive = now.date_naive().and_time(regimen.time_of_day());
    let mut anchor = Utc.from_utc_datetime(&naive);
    if anchor > now {
        anchor = anchor - Duration::days(1);
    }
    if let Some(phase) = regimen.phase_days() {
        let cycle = CYCLE_DAYS as i64;
        let phase_day = (phase.floor() as i64).rem_euclid(cycle);
        let epoch_day = anchor.timestamp().div_euclid(86_400);
        anchor = anchor - Duration::days((epoch_day - phase_day).rem_euclid(cycle));
    }
    anchor
}

/// Expand `regimen` over `window`.
///
/// The sequence starts at the last occurrence at or before the window start (or
/// now, whichever is earlier), so the dose in effect at the start is included,
/// and runs until the window end. Manual regimens expand to nothing.
pub fn expand_schedule(regimen: &RegimenDefinition, window: &ScheduleWindow) -> Schedule {
    if !regimen.mode().is_scheduled() {
        return Schedule::empty(regimen, window);
    }
    let anchor = anchor(regimen, window.now);
    let interval_ms = days_to_duration(regimen.interval_days())
        .num_milliseconds()
        .max(1);

    let from = window.start.min(window.now);
    let steps = (from - anchor).num_milliseconds().div_euclid(interval_ms);
    let first = steps
        .checked_mul(interval_ms)
        .and_then(|offset| anchor.checked_add_signed(Duration::milliseconds(offset)));

    match first {
        Some(first) => Schedule {
            model: regimen.model(),
            amount: regimen.amount(),
            first,
            interval_ms,
            end: window.end,
            empty: false,
        },
        None => Schedule::empty(regimen, window),
    }
}

/// Expand `regimen` between `start` and `end` as seen at `now`.
pub fn expand(
    regimen: &RegimenDefinition,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<Schedule> {
    let window = ScheduleWindow::new(start, end, now)?;
    Ok(expand_schedule(regimen, &window))
}

/// One calendar entry, possibly standing for several coincident doses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoseEvent {
    pub model: ModelKey,
    pub amount: f64,
    pub timestamp: DateTime<Utc>,
    pub origin: DoseOrigin,
    pub merged: usize,
}

fn precedence(origin: DoseOrigin) -> u8 {
    match origin {
        DoseOrigin::Manual => 2,
        DoseOrigin::Imported => 1,
        DoseOrigin::Scheduled => 0,
    }
}

/// Combine doses of the same model that start within `window_minutes` of an
/// event into that event, for display. The event keeps the strongest origin, so
/// a manual entry is never hidden behind a scheduled one.
pub fn merge_coincident(doses: &[Dose], window_minutes: i64) -> Vec<DoseEvent> {
    let mut sorted: Vec<&Dose> = doses.iter().collect();
    sorted.sort_by(|a, b| {
        a.timestamp()
            .cmp(&b.timestamp())
            .then(a.model().cmp(&b.model()))
    });

    let window = Duration::minutes(window_minutes.max(0));
    let mut events: Vec<DoseEvent> = Vec::with_capacity(sorted.len());
    let mut latest: HashMap<ModelKey, usize> = HashMap::new();

    for dose in sorted {
        if let Some(&index) = latest.get(&dose.model()) {
            let event = &mut events[index];
            if dose.timestamp() - event.timestamp <= window {
                event.amount += dose.amount();
                event.merged += 1;
                if precedence(dose.origin()) > precedence(event.origin) {
                    event.origin = dose.origin();
                }
                continue;
            }
        }
        latest.insert(dose.model(), events.len());
        events.push(DoseEvent {
            model: dose.model(),
            amount: dose.amount(),
            timestamp: dose.timestamp(),
            origin: dose.origin(),
            merged: 1,
        });
    }
    events
}
