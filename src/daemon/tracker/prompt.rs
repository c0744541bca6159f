use chrono::NaiveTime;

use crate::daemon::storage::settings::Settings;

/// Decides whether opening a session of `category` should ask the user what
/// they intend. Only distraction categories prompt, and only inside the
/// configured focus window. A window whose start lies after its end wraps
/// past midnight.
pub fn should_prompt(settings: &Settings, category: &str, now: NaiveTime) -> bool {
    if !settings.prompts_enabled {
        return false;
    }
    if !settings
        .distraction_categories
        .iter()
        .any(|c| c == category)
    {
        return false;
    }
    let (start, end) = (settings.focus_start, settings.focus_end);
    if start <= end {
        start <= now && now <= end
    } else {
        now >= start || now <= end
    }
}
