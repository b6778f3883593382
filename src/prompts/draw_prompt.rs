//! Instruction for the daily draw
//!
//! The model is asked for a strict JSON object; the draw generator still
//! tolerates prose around it.

use crate::prompts::build_profile_prompt;
use crate::storage::SubjectProfile;

/// User turn that opens a draw exchange
pub const DRAW_USER_TURN: &str = "开始抽卡。";

/// Builds the draw instruction for a profile at the given time
///
/// # Examples
///
/// ```
/// use fate_gateway::prompts::draw_prompt::generate_draw_prompt;
///
/// let prompt = generate_draw_prompt(None, "2024-01-01 09:00:00");
/// assert!(prompt.contains("cardName"));
/// assert!(prompt.contains("2024-01-01 09:00:00"));
/// ```
pub fn generate_draw_prompt(profile: Option<&SubjectProfile>, now: &str) -> String {
    let profile_prompt = profile.map(build_profile_prompt).unwrap_or_default();
    format!(
        "你是一个玄学抽卡占卜师。请根据用户档案与当前时间生成今日的一事一测抽卡结果。\n\
         当前时间：{now}\n\
         输出必须是严格 JSON，格式如下：\n\
         {{\"cardName\":\"...\",\"keywords\":[\"...\",\"...\"],\"interpretation\":\"...\",\"advice\":\"...\"}}\n\
         要求：\n\
         - keywords 3-5 个短语\n\
         - interpretation 80-140 字\n\
         - advice 60-120 字\n\
         - 不要输出任何额外文字、不要换行代码块\n\
         \n\
         {profile_prompt}"
    )
    .trim()
    .to_string()
}
