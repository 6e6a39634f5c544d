//! 带二进制后缀的容量解析，例如 `4k`、`1G`、`512`。

/// 解析容量字符串，后缀 `k/m/g/t/p/e`（大小写不敏感）按 1024 的幂放大。
///
/// 溢出、空串、非数字或未知后缀均返回描述原因的 `Err`。
pub fn parse_size(text: &str) -> Result<u64, String> {
    let text = text.trim();
    let split = text
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len());
    let (digits, suffix) = text.split_at(split);
    if digits.is_empty() {
        return Err("expected a number".to_owned());
    }
    let value: u64 = digits
        .parse()
        .map_err(|_| "number out of range".to_owned())?;

    let shift = match suffix.to_ascii_lowercase().as_str() {
        "" => 0,
        "k" => 10,
        "m" => 20,
        "g" => 30,
        "t" => 40,
        "p" => 50,
        "e" => 60,
        other => return Err(format!("unknown size suffix \"{other}\"")),
    };

    value
        .checked_mul(1u64 << shift)
        .ok_or_else(|| "size out of range".to_owned())
}
