use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};

use crate::docx::model::PageMargins;
use crate::docx::package::InflateGuard;

pub const DEFAULT_CONFIG_FILE: &str = "docx-reformat.toml";
pub const CONFIG_ENV_VAR: &str = "DOCX_REFORMAT_CONFIG";
/// Largest font size Word accepts; `w:sz` stores half-points.
pub const MAX_FONT_SIZE_PT: u32 = 1638;

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct FormatterConfig {
    pub version: u32,
    #[serde(default)]
    pub security: SecuritySection,
    #[serde(default)]
    pub layout: LayoutSection,
    #[serde(default)]
    pub typography: TypographySection,
    #[serde(default)]
    pub page_number: PageNumberSection,
    #[serde(default)]
    pub output: OutputSection,
}

impl Default for FormatterConfig {
    fn default() -> Self {
        Self {
            version: 1,
            security: SecuritySection::default(),
            layout: LayoutSection::default(),
            typography: TypographySection::default(),
            page_number: PageNumberSection::default(),
            output: OutputSection::default(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SecuritySection {
    pub min_inflate_ratio: f64,
    pub grace_entry_size: u64,
    pub max_entry_size: u64,
}

impl Default for SecuritySection {
    fn default() -> Self {
        let guard = InflateGuard::default();
        Self {
            min_inflate_ratio: guard.min_inflate_ratio,
            grace_entry_size: guard.grace_entry_size,
            max_entry_size: guard.max_entry_size,
        }
    }
}

/// Page margins in twentieths of a point; the left side is wider for binding.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LayoutSection {
    pub margin_left: i64,
    pub margin_right: i64,
    pub margin_top: i64,
    pub margin_bottom: i64,
}

impl Default for LayoutSection {
    fn default() -> Self {
        Self {
            margin_left: 2160,
            margin_right: 1440,
            margin_top: 1440,
            margin_bottom: 1440,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TypographySection {
    pub font_family: String,
    pub heading_size_pt: u32,
    pub body_size_pt: u32,
    /// Multiplier of single line spacing applied to every processed paragraph.
    pub line_spacing: f64,
    pub heading1_style: String,
    pub heading2_style: String,
}

impl Default for TypographySection {
    fn default() -> Self {
        Self {
            font_family: "Times New Roman".to_string(),
            heading_size_pt: 14,
            body_size_pt: 12,
            line_spacing: 2.0,
            heading1_style: "Heading1".to_string(),
            heading2_style: "Heading2".to_string(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct PageNumberSection {
    /// Shown by consumers that do not evaluate fields.
    pub fallback_text: String,
}

impl Default for PageNumberSection {
    fn default() -> Self {
        Self {
            fallback_text: "1".to_string(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct OutputSection {
    pub file_name: String,
    pub content_type: String,
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            file_name: "Formatted_Project.docx".to_string(),
            content_type: "application/octet-stream".to_string(),
        }
    }
}

impl FormatterConfig {
    pub fn from_toml_str(text: &str) -> anyhow::Result<Self> {
        let cfg: FormatterConfig = toml::from_str(text).context("parse config toml")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_toml_path(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config: {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("load config: {}", path.display()))
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.version != 1 {
            return Err(anyhow!(
                "unsupported config version: {} (expected 1)",
                self.version
            ));
        }
        if !(self.security.min_inflate_ratio >= 0.0 && self.security.min_inflate_ratio < 1.0) {
            return Err(anyhow!(
                "security.min_inflate_ratio must be in [0, 1): {}",
                self.security.min_inflate_ratio
            ));
        }
        let spacing = self.typography.line_spacing;
        if !(spacing.is_finite() && spacing > 0.0) {
            return Err(anyhow!(
                "typography.line_spacing must be a positive number: {spacing}"
            ));
        }
        for (key, size) in [
            ("heading_size_pt", self.typography.heading_size_pt),
            ("body_size_pt", self.typography.body_size_pt),
        ] {
            if !(1..=MAX_FONT_SIZE_PT).contains(&size) {
                return Err(anyhow!(
                    "typography.{key} must be in 1..={MAX_FONT_SIZE_PT}: {size}"
                ));
            }
        }
        if self.typography.font_family.trim().is_empty() {
            return Err(anyhow!("typography.font_family is empty"));
        }
        Ok(())
    }

    pub fn inflate_guard(&self) -> InflateGuard {
        InflateGuard {
            min_inflate_ratio: self.security.min_inflate_ratio,
            grace_entry_size: self.security.grace_entry_size,
            max_entry_size: self.security.max_entry_size,
        }
    }

    pub fn margins(&self) -> PageMargins {
        PageMargins {
            left: self.layout.margin_left,
            right: self.layout.margin_right,
            top: self.layout.margin_top,
            bottom: self.layout.margin_bottom,
        }
    }

    /// Explicit path, then `DOCX_REFORMAT_CONFIG`, then a default-named file
    /// found upwards; built-in defaults when none exists.
    pub fn resolve(explicit: Option<&Path>) -> anyhow::Result<(Self, Option<PathBuf>)> {
        let path = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from))
            .or_else(|| find_default_config(DEFAULT_CONFIG_FILE));
        match path {
            Some(p) => Ok((Self::from_toml_path(&p)?, Some(p))),
            None => Ok((Self::default(), None)),
        }
    }
}

pub fn find_file_upwards(start_dir: &Path, filename: &str, max_levels: usize) -> Option<PathBuf> {
    let mut dir = start_dir;
    for _ in 0..=max_levels {
        let candidate = dir.join(filename);
        if candidate.exists() {
            return Some(candidate);
        }
        dir = dir.parent()?;
    }
    None
}

pub fn find_default_config(filename: &str) -> Option<PathBuf> {
    if let Ok(cwd) = std::env::current_dir() {
        if let Some(p) = find_file_upwards(&cwd, filename, 8) {
            return Some(p);
        }
    }
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            if let Some(p) = find_file_upwards(dir, filename, 10) {
                return Some(p);
            }
        }
    }
    None
}

const DEFAULT_CONFIG_TOML: &str = r#"version = 1

[security]
# Entries whose compressed/uncompressed ratio falls below this are refused.
min_inflate_ratio = 0.001
grace_entry_size = 102400
max_entry_size = 4294967295

[layout]
# Twentieths of a point (1440 = 1 inch).
margin_left = 2160
margin_right = 1440
margin_top = 1440
margin_bottom = 1440

[typography]
font_family = "Times New Roman"
heading_size_pt = 14
body_size_pt = 12
line_spacing = 2.0
heading1_style = "Heading1"
heading2_style = "Heading2"

[page_number]
fallback_text = "1"

[output]
file_name = "Formatted_Project.docx"
content_type = "application/octet-stream"
"#;

pub fn init_default_config(dir: &Path, force: bool) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("create config dir: {}", dir.display()))?;
    let cfg_path = dir.join(DEFAULT_CONFIG_FILE);
    if cfg_path.exists() && !force {
        return Ok(cfg_path);
    }
    std::fs::write(&cfg_path, DEFAULT_CONFIG_TOML)
        .with_context(|| format!("write config: {}", cfg_path.display()))?;
    Ok(cfg_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_matches_defaults() {
        let cfg = FormatterConfig::from_toml_str(DEFAULT_CONFIG_TOML).expect("parse template");
        assert_eq!(cfg, FormatterConfig::default());
    }

    #[test]
    fn partial_config_fills_defaults() {
        let cfg = FormatterConfig::from_toml_str(
            "version = 1\n[typography]\nfont_family = \"Garamond\"\n",
        )
        .expect("parse");
        assert_eq!(cfg.typography.font_family, "Garamond");
        assert_eq!(cfg.typography.heading_size_pt, 14);
        assert_eq!(cfg.margins().left, 2160);
    }

    #[test]
    fn rejects_unknown_version_and_bad_values() {
        assert!(FormatterConfig::from_toml_str("version = 2").is_err());
        assert!(FormatterConfig::from_toml_str("").is_err());
        assert!(FormatterConfig::from_toml_str(
            "version = 1\n[typography]\nline_spacing = 0.0\n"
        )
        .is_err());
        assert!(FormatterConfig::from_toml_str(
            "version = 1\n[security]\nmin_inflate_ratio = 1.5\n"
        )
        .is_err());
    }

    #[test]
    fn rejects_non_finite_spacing_and_out_of_range_sizes() {
        for bad in [
            "line_spacing = nan",
            "line_spacing = inf",
            "line_spacing = -1.5",
            "heading_size_pt = 0",
            "heading_size_pt = 3000000000",
            "body_size_pt = 1639",
        ] {
            let toml = format!("version = 1\n[typography]\n{bad}\n");
            let err = FormatterConfig::from_toml_str(&toml).err();
            assert!(err.is_some(), "accepted {bad}");
        }
        let max = format!("version = 1\n[typography]\nbody_size_pt = {MAX_FONT_SIZE_PT}\n");
        assert!(FormatterConfig::from_toml_str(&max).is_ok());
    }

    #[test]
    fn init_writes_once_unless_forced() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = init_default_config(dir.path(), false).expect("init");
        std::fs::write(&path, "version = 1\n").expect("overwrite");
        init_default_config(dir.path(), false).expect("init again");
        assert_eq!(std::fs::read_to_string(&path).expect("read"), "version = 1\n");
        init_default_config(dir.path(), true).expect("force");
        let (cfg, found) = FormatterConfig::resolve(Some(&path)).expect("resolve");
        assert_eq!(found.as_deref(), Some(path.as_path()));
        assert_eq!(cfg, FormatterConfig::default());
    }

    #[test]
    fn find_file_upwards_walks_parents() {
        let dir = tempfile::tempdir().expect("tempdir");
        let nested = dir.path().join("a/b/c");
        std::fs::create_dir_all(&nested).expect("mkdir");
        std::fs::write(dir.path().join(DEFAULT_CONFIG_FILE), "version = 1\n").expect("write");
        let found = find_file_upwards(&nested, DEFAULT_CONFIG_FILE, 8).expect("found");
        assert_eq!(found, dir.path().join(DEFAULT_CONFIG_FILE));
        assert!(find_file_upwards(&nested, DEFAULT_CONFIG_FILE, 1).is_none());
    }
}
