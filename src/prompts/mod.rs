//! System prompts for the model
//!
//! This module holds the instruction templates sent to the model and the
//! renderer that turns a [`SubjectProfile`] into a preamble block.

pub mod draw_prompt;

use crate::storage::SubjectProfile;

/// Default chat instruction. `{time}` is replaced with the current local time.
pub const DEFAULT_SYSTEM_PROMPT: &str = "你是一个精通八字，紫微斗数，奇门遁甲等命理知识的玄学大师，我是一个命理师，帮我为客户看一下她的八字并回复用户的问题。八字：xx xx xx xx，性别、出生地，起运时间，当前大运。\n现在是{time}";

/// Instruction used for chat title generation
pub const TITLE_PROMPT: &str =
    "请基于用户的第一条消息生成一个不超过12个字的聊天标题，直接输出标题文本，不要加引号。";

/// Placeholder substituted by [`render_instruction`]
const TIME_PLACEHOLDER: &str = "{time}";

/// Format used for timestamps inside prompts
pub const PROMPT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Renders an instruction template with the given timestamp
///
/// Returns an empty string for a blank template so callers can skip the block.
///
/// # Examples
///
/// ```
/// use fate_gateway::prompts::render_instruction;
///
/// let rendered = render_instruction("now: {time}", "2024-01-01 08:00:00");
/// assert_eq!(rendered, "now: 2024-01-01 08:00:00");
/// assert!(render_instruction("   ", "2024-01-01 08:00:00").is_empty());
/// ```
pub fn render_instruction(template: &str, now: &str) -> String {
    if template.trim().is_empty() {
        return String::new();
    }
    template.replace(TIME_PLACEHOLDER, now).trim().to_string()
}

/// Renders the structured profile block appended to the system message
///
/// Empty when the profile carries no descriptive field at all.
pub fn build_profile_prompt(profile: &SubjectProfile) -> String {
    let descriptive = [
        &profile.name,
        &profile.gender,
        &profile.location,
        &profile.location_detail,
        &profile.solar,
        &profile.lunar,
        &profile.true_solar,
    ];
    if descriptive.iter().all(|field| field.trim().is_empty()) {
        return String::new();
    }

    let location_line = if !profile.location_detail.is_empty()
        && !profile.location.contains(profile.location_detail.as_str())
    {
        format!("{} {}", profile.location, profile.location_detail)
            .trim()
            .to_string()
    } else {
        profile.location.clone()
    };

    format!(
        "用户档案信息（结构化）：\n\
         - 姓名：{}\n\
         - 性别：{}\n\
         - 出生地：{}\n\
         - 坐标：经度{}，纬度{}\n\
         - 出生时间（阳历）：{}\n\
         - 出生时间（阴历）：{}\n\
         - 真太阳时：{}\n\
         请在后续分析中结合以上信息。",
        profile.name,
        profile.gender,
        location_line,
        format_coordinate(profile.longitude),
        format_coordinate(profile.latitude),
        profile.solar,
        profile.lunar,
        profile.true_solar,
    )
}

fn format_coordinate(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}
