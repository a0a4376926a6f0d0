//! Due-ness computation for a single mirror config (§4.4 step 2).

use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use cron::Schedule;
use forgekeep_db::MirrorConfigRecord;

use crate::error::{Result, SchedulerError};

/// Widens a standard 5-field Unix cron expression (minute hour dom month dow)
/// to the 7-field form the `cron` crate expects, prepending seconds and
/// appending a year wildcard. Expressions already carrying 6+ fields pass
/// through unchanged.
fn widen_to_seven_fields(expression: &str) -> String {
	match expression.split_whitespace().count() {
		n if n >= 6 => expression.to_string(),
		5 => format!("0 {expression} *"),
		_ => expression.to_string(),
	}
}

fn next_fire_after(expression: &str, after: DateTime<Utc>) -> Result<DateTime<Utc>> {
	let widened = widen_to_seven_fields(expression);
	let schedule = Schedule::from_str(&widened).map_err(|e| SchedulerError::InvalidCronExpression {
		expression: expression.to_string(),
		reason: e.to_string(),
	})?;
	schedule.after(&after).next().ok_or_else(|| SchedulerError::InvalidCronExpression {
		expression: expression.to_string(),
		reason: "schedule has no next occurrence".to_string(),
	})
}

/// Is this mirror config due for a sync as of `now`? Mirrors §4.4 step 2's
/// three-way decision: never synced, cron-scheduled, fixed-interval, or
/// (falling through both) always due.
pub fn is_due(config: &MirrorConfigRecord, now: DateTime<Utc>) -> Result<bool> {
	let Some(last_synced_at) = config.last_synced_at else {
		return Ok(true);
	};

	if let Some(expression) = config.sync_schedule.as_deref() {
		let next = next_fire_after(expression, last_synced_at)?;
		return Ok(now >= next);
	}

	if let Some(interval_seconds) = config.sync_interval_seconds {
		if interval_seconds > 0 {
			return Ok(now >= last_synced_at + Duration::seconds(interval_seconds));
		}
	}

	Ok(true)
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::TimeZone;
	use uuid::Uuid;

	fn base_config() -> MirrorConfigRecord {
		MirrorConfigRecord {
			repository_id: Uuid::new_v4(),
			enabled: true,
			direction: "both".to_string(),
			upstream_url: Some("https://example.invalid/up.git".to_string()),
			upstream_creds_ref: None,
			downstream_url: None,
			downstream_creds_ref: None,
			sync_interval_seconds: None,
			sync_schedule: None,
			last_synced_at: None,
			status: "idle".to_string(),
			last_error: None,
		}
	}

	#[test]
	fn never_synced_is_always_due() {
		let config = base_config();
		assert!(is_due(&config, Utc::now()).unwrap());
	}

	#[test]
	fn no_schedule_and_no_interval_is_always_due() {
		let mut config = base_config();
		config.last_synced_at = Some(Utc::now());
		assert!(is_due(&config, Utc::now()).unwrap());
	}

	#[test]
	fn zero_interval_falls_through_to_always_due() {
		let mut config = base_config();
		config.last_synced_at = Some(Utc::now());
		config.sync_interval_seconds = Some(0);
		assert!(is_due(&config, Utc::now()).unwrap());
	}

	#[test]
	fn fixed_interval_not_yet_elapsed_is_not_due() {
		let mut config = base_config();
		let last = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
		config.last_synced_at = Some(last);
		config.sync_interval_seconds = Some(3600);
		let now = last + Duration::minutes(30);
		assert!(!is_due(&config, now).unwrap());
	}

	#[test]
	fn fixed_interval_elapsed_is_due() {
		let mut config = base_config();
		let last = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
		config.last_synced_at = Some(last);
		config.sync_interval_seconds = Some(3600);
		let now = last + Duration::hours(2);
		assert!(is_due(&config, now).unwrap());
	}

	#[test]
	fn cron_schedule_every_five_minutes() {
		let mut config = base_config();
		let last = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
		config.last_synced_at = Some(last);
		config.sync_schedule = Some("*/5 * * * *".to_string());

		assert!(!is_due(&config, last + Duration::minutes(1)).unwrap());
		assert!(is_due(&config, last + Duration::minutes(5)).unwrap());
	}

	#[test]
	fn invalid_cron_expression_is_an_error() {
		let mut config = base_config();
		config.last_synced_at = Some(Utc::now());
		config.sync_schedule = Some("not a cron expression".to_string());
		assert!(is_due(&config, Utc::now()).is_err());
	}

	proptest::proptest! {
		#[test]
		fn widening_never_panics_on_arbitrary_input(expression in "\\PC{0,40}") {
			let _ = widen_to_seven_fields(&expression);
		}

		#[test]
		fn is_due_never_panics_on_arbitrary_schedule_strings(expression in "\\PC{0,40}", elapsed_secs in 0i64..1_000_000) {
			let mut config = base_config();
			config.last_synced_at = Some(Utc::now() - Duration::seconds(elapsed_secs));
			config.sync_schedule = Some(expression);
			let _ = is_due(&config, Utc::now());
		}

		#[test]
		fn well_formed_five_field_expressions_always_widen_to_seven_fields(
			minute in "[0-9*/,-]{1,5}",
			hour in "[0-9*/,-]{1,5}",
			dom in "[0-9*/,-]{1,5}",
			month in "[0-9*/,-]{1,5}",
			dow in "[0-9*/,-]{1,5}",
		) {
			let expression = format!("{minute} {hour} {dom} {month} {dow}");
			let widened = widen_to_seven_fields(&expression);
			prop_assert_eq!(widened.split_whitespace().count(), 7);
		}
	}
}
