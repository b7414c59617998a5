//! Event timeline merger.
//!
//! Events from several logical sources are concatenated in source order,
//! de-duplicated by `event_id` (first occurrence wins) and stable-sorted by
//! `occurred_at`, newest first. Ties keep their input order, so repeated runs
//! on identical input produce identical output.
//!
//! Filtering never touches the merged sequence: [`Timeline::view`] returns a
//! borrowing iterator, and the same timeline can be re-filtered any number of
//! times.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::event::{EventType, Severity, TimelineEvent};

/// Sort newest first. `sort_by` is stable, which keeps ties in input order.
pub fn sort_events(events: &mut [TimelineEvent]) {
  events.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));
}

// ─── Timeline ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeline {
  events: Vec<TimelineEvent>,
}

impl Timeline {
  /// Merge several sources into one ordered, de-duplicated timeline.
  pub fn merge<I>(sources: I) -> Self
  where
    I: IntoIterator,
    I::Item: IntoIterator<Item = TimelineEvent>,
  {
    let mut seen = HashSet::new();
    let mut events: Vec<TimelineEvent> = sources
      .into_iter()
      .flatten()
      .filter(|event| seen.insert(event.event_id.clone()))
      .collect();
    sort_events(&mut events);
    Self { events }
  }

  pub fn events(&self) -> &[TimelineEvent] { &self.events }

  pub fn len(&self) -> usize { self.events.len() }

  pub fn is_empty(&self) -> bool { self.events.is_empty() }

  /// Lazily filter the timeline. Order is preserved.
  pub fn view<'a>(
    &'a self,
    filter: &'a TimelineFilter,
  ) -> impl Iterator<Item = &'a TimelineEvent> + 'a {
    self.events.iter().filter(move |event| filter.matches(event))
  }

  pub fn summary(&self) -> TimelineSummary { TimelineSummary::of(&self.events) }
}

impl FromIterator<TimelineEvent> for Timeline {
  fn from_iter<T: IntoIterator<Item = TimelineEvent>>(iter: T) -> Self {
    Self::merge([iter.into_iter().collect::<Vec<_>>()])
  }
}

// ─── Filter ──────────────────────────────────────────────────────────────────

/// A conjunction of predicates over events. Unset predicates match
/// everything, so [`TimelineFilter::all`] keeps every event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimelineFilter {
  event_type: Option<EventType>,
  severity:   Option<Severity>,
  /// Lower-cased search needle.
  text:       Option<String>,
}

impl TimelineFilter {
  pub fn all() -> Self { Self::default() }

  /// Restrict to one event type; `None` means all types.
  pub fn event_type(mut self, event_type: Option<EventType>) -> Self {
    self.event_type = event_type;
    self
  }

  pub fn severity(mut self, severity: Option<Severity>) -> Self {
    self.severity = severity;
    self
  }

  /// Case-insensitive substring over details, actor name and actor user id;
  /// any one of them matching is enough. Blank text is ignored.
  pub fn text(mut self, text: impl AsRef<str>) -> Self {
    let text = text.as_ref().trim();
    self.text = (!text.is_empty()).then(|| text.to_lowercase());
    self
  }

  pub fn matches(&self, event: &TimelineEvent) -> bool {
    if self.event_type.is_some_and(|t| t != event.event_type) {
      return false;
    }
    if self.severity.is_some_and(|s| s != event.severity) {
      return false;
    }
    let Some(needle) = &self.text else {
      return true;
    };
    [
      event.details.as_str(),
      event.actor.display_name.as_str(),
      event.actor.user_id.as_str(),
    ]
    .iter()
    .any(|field| field.to_lowercase().contains(needle.as_str()))
  }
}

// ─── Summary ─────────────────────────────────────────────────────────────────

/// Counts per event type and per severity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineSummary {
  pub total:         usize,
  pub by_event_type: BTreeMap<EventType, usize>,
  pub by_severity:   BTreeMap<Severity, usize>,
}

impl TimelineSummary {
  pub fn of(events: &[TimelineEvent]) -> Self {
    let mut summary = Self { total: events.len(), ..Self::default() };
    for event in events {
      *summary.by_event_type.entry(event.event_type).or_insert(0) += 1;
      *summary.by_severity.entry(event.severity).or_insert(0) += 1;
    }
    summary
  }
}

#[cfg(test)]
mod tests {
  use chrono::{DateTime, TimeZone, Utc};

  use super::*;
  use crate::event::Actor;

  fn at(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 10, 20, h, m, 0).unwrap()
  }

  fn ev(id: &str, occurred_at: DateTime<Utc>) -> TimelineEvent {
    TimelineEvent {
      event_id: id.into(),
      event_type: EventType::Wifi,
      occurred_at,
      actor: Actor { user_id: "system".into(), display_name: "Unknown".into() },
      location_id: "unknown".into(),
      details: format!("Event {id}"),
      severity: Severity::Info,
      source: "WiFi Log".into(),
    }
  }

  fn ids(events: &[TimelineEvent]) -> Vec<&str> {
    events.iter().map(|e| e.event_id.as_str()).collect()
  }

  #[test]
  fn equal_timestamps_keep_input_order() {
    let t = Utc.with_ymd_and_hms(2024, 10, 20, 9, 45, 0).unwrap();
    let timeline = Timeline::merge([vec![ev("A", t), ev("B", t)]]);
    assert_eq!(ids(timeline.events()), vec!["A", "B"]);
  }

  #[test]
  fn sorts_newest_first_across_sources() {
    let wifi = vec![ev("w1", at(9, 15)), ev("w2", at(9, 42))];
    let swipe = vec![ev("s1", at(9, 25)), ev("s2", at(9, 38))];
    let timeline = Timeline::merge([wifi, swipe]);
    assert_eq!(ids(timeline.events()), vec!["w2", "s2", "s1", "w1"]);
  }

  #[test]
  fn sorting_is_idempotent() {
    let input = vec![
      ev("a", at(9, 20)),
      ev("b", at(9, 45)),
      ev("c", at(9, 20)),
      ev("d", at(9, 30)),
      ev("e", at(9, 45)),
    ];
    let once = Timeline::merge([input]);
    let twice = Timeline::merge([once.events().to_vec()]);
    assert_eq!(once, twice);
    assert_eq!(ids(once.events()), vec!["b", "e", "d", "a", "c"]);
  }

  #[test]
  fn ties_follow_input_order_under_shuffles() {
    let tied = at(9, 45);
    let orders: [&[&str]; 3] = [&["x", "y", "z"], &["z", "x", "y"], &["y", "z", "x"]];
    for order in orders {
      let mut input: Vec<_> = order.iter().map(|id| ev(id, tied)).collect();
      input.insert(1, ev("early", at(8, 0)));
      input.push(ev("late", at(10, 0)));
      let timeline = Timeline::merge([input]);
      let mut expected = vec!["late"];
      expected.extend_from_slice(order);
      expected.push("early");
      assert_eq!(ids(timeline.events()), expected);
    }
  }

  #[test]
  fn duplicate_ids_keep_first_occurrence() {
    let mut dup = ev("a", at(11, 0));
    dup.details = "second copy".into();
    let timeline = Timeline::merge([vec![ev("a", at(9, 0))], vec![dup, ev("b", at(10, 0))]]);
    assert_eq!(ids(timeline.events()), vec!["b", "a"]);
    assert_eq!(timeline.events()[1].details, "Event a");
  }

  #[test]
  fn views_are_restartable_and_do_not_mutate() {
    let mut swipe = ev("s", at(9, 25));
    swipe.event_type = EventType::Swipe;
    swipe.actor.display_name = "Amit Kumar".into();
    let mut alert = ev("c", at(9, 20));
    alert.event_type = EventType::Critical;
    alert.severity = Severity::Critical;
    alert.details = "Unauthorized access attempt detected".into();
    let timeline = Timeline::merge([vec![ev("w", at(9, 42)), swipe, alert]]);
    let before = timeline.clone();

    let swipes = TimelineFilter::all().event_type(Some(EventType::Swipe));
    assert_eq!(timeline.view(&swipes).count(), 1);
    assert_eq!(timeline.view(&swipes).count(), 1);

    let amit = TimelineFilter::all().text("AMIT");
    assert_eq!(timeline.view(&amit).next().unwrap().event_id, "s");

    let unauthorized = TimelineFilter::all().text("unauthorized");
    assert_eq!(timeline.view(&unauthorized).next().unwrap().event_id, "c");

    let by_user = TimelineFilter::all().text("sys");
    assert_eq!(timeline.view(&by_user).count(), 3);

    let critical = TimelineFilter::all().severity(Some(Severity::Critical));
    assert_eq!(timeline.view(&critical).count(), 1);

    let none = TimelineFilter::all()
      .event_type(Some(EventType::Swipe))
      .severity(Some(Severity::Critical));
    assert_eq!(timeline.view(&none).count(), 0);

    assert_eq!(timeline.view(&TimelineFilter::all()).count(), 3);
    assert_eq!(timeline, before);
  }

  #[test]
  fn summary_counts() {
    let mut alert = ev("c", at(9, 20));
    alert.event_type = EventType::Critical;
    alert.severity = Severity::Critical;
    let timeline: Timeline = vec![ev("a", at(9, 0)), ev("b", at(9, 1)), alert]
      .into_iter()
      .collect();
    let summary = timeline.summary();
    assert_eq!(summary.total, 3);
    assert_eq!(summary.by_event_type[&EventType::Wifi], 2);
    assert_eq!(summary.by_severity[&Severity::Critical], 1);
  }
}
