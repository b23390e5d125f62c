use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result, anyhow};

use crate::core::CsfFunction;

#[derive(Debug, Clone, PartialEq)]
pub struct SubcategoryInfo {
    pub function: CsfFunction,
    pub name: String,
    pub weight: f64,
    pub recommendation: String,
}

#[derive(Debug, Clone, Default)]
pub struct Reference {
    by_id: BTreeMap<String, SubcategoryInfo>,
}

impl Reference {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(anyhow!(
                "CSFルックアップが見つかりません: {}",
                path.display()
            ));
        }
        let file = std::fs::File::open(path).with_context(|| {
            format!("CSFルックアップを開けませんでした: {}", path.display())
        })?;
        Self::from_reader(file)
            .with_context(|| format!("CSFルックアップの解析に失敗しました: {}", path.display()))
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::Reader::from_reader(reader);
        let headers = rdr
            .headers()
            .context("ルックアップCSVのヘッダーを読み取れませんでした")?
            .clone();

        let find = |name: &str| headers.iter().position(|h| h.trim() == name);
        let idx_id = find("csf_subcategory_id").ok_or_else(|| {
            anyhow!("ルックアップCSVに 'csf_subcategory_id' 列がありません")
        })?;
        let idx_name = find("csf_name")
            .or_else(|| find("csf_subcategory_name"))
            .or_else(|| find("name"));
        let idx_weight = find("weight");
        let idx_recommendation = find("recommendation");

        let mut by_id = BTreeMap::new();
        for (i, record) in rdr.records().enumerate() {
            let line = i + 2;
            let record = record.with_context(|| {
                format!("ルックアップCSVの {line} 行目を読み取れませんでした")
            })?;

            let id = record.get(idx_id).unwrap_or("").trim().to_string();
            if id.is_empty() {
                continue;
            }

            let name = idx_name
                .and_then(|j| record.get(j))
                .unwrap_or("")
                .trim()
                .to_string();
            let weight = match idx_weight.and_then(|j| record.get(j)).map(str::trim) {
                None | Some("") => 1.0,
                Some(cell) => {
                    let w = cell.parse::<f64>().map_err(|_| {
                        anyhow!(
                            "ルックアップCSVの weight を数値として解析できません（{line} 行目）: {cell}"
                        )
                    })?;
                    if w < 0.0 {
                        return Err(anyhow!(
                            "ルックアップCSVの weight は 0 以上である必要があります（{line} 行目）: {cell}"
                        ));
                    }
                    w
                }
            };
            let recommendation = idx_recommendation
                .and_then(|j| record.get(j))
                .unwrap_or("")
                .trim()
                .to_string();

            let function = CsfFunction::from_subcategory_id(&id);
            by_id.insert(
                id,
                SubcategoryInfo {
                    function,
                    name,
                    weight,
                    recommendation,
                },
            );
        }

        Ok(Self { by_id })
    }

    pub fn get(&self, id: &str) -> Option<&SubcategoryInfo> {
        self.by_id.get(id.trim())
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
