//! Human-readable alert text.
//!
//! Formatting is stateless: the greeting depends only on a random roll and
//! the wall-clock time, and never feeds back into lifecycle decisions.

use chrono::{Datelike, Local, NaiveDateTime, Timelike, Weekday};
use rand::Rng;

use crate::types::ResourceIdentity;

/// Openers picked at random for alert messages.
pub const GREETINGS: [&str; 10] = [
    "Guys real talk :point_up:,",
    "It's me again, the lovely bot from the neighborhood and",
    "Alright, so",
    "Yo bois :dark_sunglasses:,",
    "Sorry to interrupt,",
    "I'm back :v:,",
    "Yes I know I'm annoying :grin:, but",
    "Where is the cluster admin :face_with_monocle:, because",
    "I just wanted to chill :expressionless: and then I checked the cluster one more time and",
    "What would you do without me? I just checked the cluster again and",
];

/// Picks a greeting for `roll` in `0..=GREETINGS.len()`.
///
/// The extra slot past the fixed list selects a greeting based on the day and
/// hour of `at`. Out-of-range rolls wrap around.
#[must_use]
pub fn select_greeting(roll: usize, at: NaiveDateTime) -> &'static str {
    let slot = roll % (GREETINGS.len() + 1);
    GREETINGS.get(slot).copied().unwrap_or_else(|| time_greeting(at))
}

/// Greeting for the given local time.
#[must_use]
pub fn time_greeting(at: NaiveDateTime) -> &'static str {
    match (at.weekday(), at.hour()) {
        (Weekday::Sun, _) => "Damn sorry to interrupt your Sunday :face_with_rolling_eyes:, but",
        (Weekday::Sat, _) => "Yes I know it's weekend, but",
        (_, 0..=11) => "Good morning everyone :wave:,",
        (_, 12..=14) => "Hello everyone :wave:,",
        (_, 15..=17) => "Good afternoon everyone :wave:,",
        _ => "Good evening everyone :wave:,",
    }
}

/// Random greeting for the current local time.
#[must_use]
pub fn greeting() -> &'static str {
    let roll = rand::thread_rng().gen_range(0..=GREETINGS.len());
    select_greeting(roll, Local::now().naive_local())
}

/// Text sent when a problem is first reported.
#[must_use]
pub fn format_report(greeting: &str, identity: &ResourceIdentity, message: &str) -> String {
    if identity.is_namespaced() {
        format!(
            "{greeting} there seems to be a problem with {} '{}' in namespace '{}': {message}",
            identity.kind, identity.name, identity.namespace
        )
    } else {
        format!(
            "{greeting} there seems to be a problem with {} '{}': {message}",
            identity.kind, identity.name
        )
    }
}

/// Text sent when a reported problem is resolved.
#[must_use]
pub fn format_resolve(greeting: &str, identity: &ResourceIdentity) -> String {
    format!(
        "{greeting} do you remember the problem with {} '{}'? Good news, seems like this is not a problem anymore :tada:",
        identity.kind, identity.name
    )
}
