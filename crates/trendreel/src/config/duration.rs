/*
 *  Copyright 2025-2026 Trendreel Developers
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Human-friendly durations (`90d`, `24h`, `1h30m`).

use chrono::Duration;

use super::ValidationError;

/// Parse a duration string like "90d", "30d", "7d", "24h", "1h30m" into a chrono::Duration.
///
/// Supported units:
/// - `d` - days
/// - `h` - hours
/// - `m` - minutes
/// - `s` - seconds
///
/// Examples:
/// - "90d" -> 90 days
/// - "24h" -> 24 hours
/// - "7d12h" -> 7 days and 12 hours
pub fn parse_duration(s: &str) -> Result<Duration, ValidationError> {
    let invalid = |reason: String| ValidationError::InvalidDuration {
        value: s.to_string(),
        reason,
    };

    let normalized = s.trim().to_lowercase();
    if normalized.is_empty() {
        return Err(invalid("duration string cannot be empty".to_string()));
    }

    let mut total = Duration::zero();
    let mut current_num = String::new();

    for c in normalized.chars() {
        if c.is_ascii_digit() {
            current_num.push(c);
            continue;
        }

        if current_num.is_empty() {
            return Err(invalid(format!("expected number before '{c}'")));
        }
        let num: i64 = current_num
            .parse()
            .map_err(|_| invalid(format!("invalid number {current_num}")))?;
        current_num.clear();

        let part = match c {
            'd' => Duration::try_days(num),
            'h' => Duration::try_hours(num),
            'm' => Duration::try_minutes(num),
            's' => Duration::try_seconds(num),
            _ => return Err(invalid(format!("unknown unit '{c}', use d, h, m or s"))),
        }
        .ok_or_else(|| invalid("duration out of range".to_string()))?;

        total = total
            .checked_add(&part)
            .ok_or_else(|| invalid("duration out of range".to_string()))?;
    }

    // Remaining digits without a unit.
    if !current_num.is_empty() {
        return Err(invalid("missing unit, use d, h, m or s".to_string()));
    }

    Ok(total)
}
