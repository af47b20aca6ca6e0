//! Rendering of agent instruction templates.

use chrono::{DateTime, Utc};
use minijinja::{Environment, context};
use thiserror::Error;

/// Error returned when an instruction template cannot be rendered.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("instruction template rendering failed: {0}")]
pub struct InstructionError(pub String);

/// Renders an instruction template.
///
/// Templates may use `{{ currentDate }}` (for example `16 October 2026`) and
/// `{{ hostPlatform }}` (operating system and architecture).
///
/// # Errors
///
/// Returns [`InstructionError`] when the template does not parse.
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use switchboard::session::domain::render_instruction;
///
/// let now = Utc.with_ymd_and_hms(2026, 10, 16, 9, 0, 0).single().expect("valid date");
/// let rendered = render_instruction("Today is {{ currentDate }}.", now).expect("valid template");
/// assert_eq!(rendered, "Today is 16 October 2026.");
/// ```
pub fn render_instruction(template: &str, now: DateTime<Utc>) -> Result<String, InstructionError> {
    let environment = Environment::new();
    environment
        .render_str(
            template,
            context! {
                currentDate => now.format("%d %B %Y").to_string(),
                hostPlatform => host_platform(),
            },
        )
        .map_err(|error| InstructionError(error.to_string()))
}

fn host_platform() -> String {
    format!("{} {}", std::env::consts::OS, std::env::consts::ARCH)
}
