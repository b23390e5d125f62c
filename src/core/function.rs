use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CsfFunction {
    Govern,
    Identify,
    Protect,
    Detect,
    Respond,
    Recover,
    Unknown,
}

impl CsfFunction {
    pub const fn as_str(self) -> &'static str {
        match self {
            CsfFunction::Govern => "Govern",
            CsfFunction::Identify => "Identify",
            CsfFunction::Protect => "Protect",
            CsfFunction::Detect => "Detect",
            CsfFunction::Respond => "Respond",
            CsfFunction::Recover => "Recover",
            CsfFunction::Unknown => "Unknown",
        }
    }

    // サブカテゴリIDのドット前2文字から導出する。ドットを含まないIDは Unknown。
    pub fn from_subcategory_id(id: &str) -> CsfFunction {
        let Some((prefix, _)) = id.split_once('.') else {
            return CsfFunction::Unknown;
        };
        match prefix.to_ascii_uppercase().as_str() {
            "GV" => CsfFunction::Govern,
            "ID" => CsfFunction::Identify,
            "PR" => CsfFunction::Protect,
            "DE" => CsfFunction::Detect,
            "RS" => CsfFunction::Respond,
            "RC" => CsfFunction::Recover,
            _ => CsfFunction::Unknown,
        }
    }
}

impl fmt::Display for CsfFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_function_from_id_prefix() {
        assert_eq!(
            CsfFunction::from_subcategory_id("GV.PO-01"),
            CsfFunction::Govern
        );
        assert_eq!(
            CsfFunction::from_subcategory_id("ID.AM-02"),
            CsfFunction::Identify
        );
        assert_eq!(
            CsfFunction::from_subcategory_id("PR.IR-01"),
            CsfFunction::Protect
        );
        assert_eq!(
            CsfFunction::from_subcategory_id("DE.CM-01"),
            CsfFunction::Detect
        );
        assert_eq!(
            CsfFunction::from_subcategory_id("RS.MA-01"),
            CsfFunction::Respond
        );
        assert_eq!(
            CsfFunction::from_subcategory_id("RC.RP-01"),
            CsfFunction::Recover
        );
    }

    #[test]
    fn malformed_ids_map_to_unknown() {
        assert_eq!(
            CsfFunction::from_subcategory_id("INVALID"),
            CsfFunction::Unknown
        );
        assert_eq!(CsfFunction::from_subcategory_id(""), CsfFunction::Unknown);
        assert_eq!(
            CsfFunction::from_subcategory_id("XX.YY-01"),
            CsfFunction::Unknown
        );
    }
}
