pub const UNKNOWN_CHAPTER: &str = "unknown";

/// Returns the leading `ch<digits>` of a scene id, e.g. `ch01_s1_welcome` -> `ch01`.
///
/// Ids without that prefix land in the `unknown` chapter.
pub fn classify(scene_id: &str) -> &str {
    let Some(rest) = scene_id.strip_prefix("ch") else {
        return UNKNOWN_CHAPTER;
    };
    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return UNKNOWN_CHAPTER;
    }
    &scene_id[.."ch".len() + digits]
}
