//! Per-image records gathered while scanning a script, before images are built.

use std::collections::BTreeMap;

use pano_core::{Real, Rect2D, VARIABLE_CODES};

use crate::parse::{param, parse_rect, pt_param, string_param, var_param, VarField};

/// One `i` or `o` line.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct ImageLine {
    /// 1-based script line, for diagnostics.
    pub line: usize,
    pub vars: BTreeMap<&'static str, VarField>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub projection: Option<i64>,
    pub filename: Option<String>,
    pub crop: Option<Rect2D>,
    pub vig_corr_mode: Option<u32>,
    pub flatfield: Option<String>,
    pub response_type: Option<i64>,
}

impl ImageLine {
    pub fn parse(line_nr: usize, line: &str) -> Self {
        let vars = VARIABLE_CODES
            .iter()
            .filter_map(|c| var_param(line, c.code).map(|field| (c.code, field)))
            .collect();
        // `S` is the newer spelling and wins over `C`
        let crop = pt_param(line, "S")
            .and_then(parse_rect)
            .or_else(|| pt_param(line, "C").and_then(parse_rect));
        Self {
            line: line_nr,
            vars,
            width: param(line, "w"),
            height: param(line, "h"),
            projection: param(line, "f"),
            filename: string_param(line, "n").filter(|s| !s.is_empty()),
            crop,
            vig_corr_mode: param(line, "Vm"),
            flatfield: string_param(line, "Vf"),
            response_type: param(line, "Rt"),
        }
    }

    /// Take from `other` what this line leaves open.
    ///
    /// A variable comes from `other` when it is missing here, or when it is a plain value
    /// here but a link there.
    pub fn merge_from(&mut self, other: &ImageLine) {
        for (&code, &field) in &other.vars {
            let take = match self.vars.get(code) {
                None => true,
                Some(VarField::Value(_)) => matches!(field, VarField::Link(_)),
                Some(VarField::Link(_)) => false,
            };
            if take {
                self.vars.insert(code, field);
            }
        }
        if self.filename.is_none() {
            self.filename.clone_from(&other.filename);
        }
        if self.crop.map_or(true, |c| c.is_empty()) {
            self.crop = other.crop;
        }
        if self.width.map_or(true, |w| w == 0) {
            self.width = other.width;
        }
        if self.height.map_or(true, |h| h == 0) {
            self.height = other.height;
        }
        self.projection = self.projection.or(other.projection);
        self.vig_corr_mode = self.vig_corr_mode.or(other.vig_corr_mode);
        if self.flatfield.is_none() {
            self.flatfield.clone_from(&other.flatfield);
        }
        self.response_type = self.response_type.or(other.response_type);
    }

    /// Value of `code`, or its script default when absent or linked.
    pub fn value(&self, code: &str) -> Real {
        match self.vars.get(code) {
            Some(VarField::Value(v)) => *v,
            _ => default_value(code),
        }
    }

    pub fn link(&self, code: &str) -> Option<usize> {
        match self.vars.get(code) {
            Some(VarField::Link(target)) => Some(*target),
            _ => None,
        }
    }
}

fn default_value(code: &str) -> Real {
    match code {
        "v" => 51.0,
        "Va" | "Er" | "Eb" => 1.0,
        _ => 0.0,
    }
}

/// Image metadata from a `#-hugin` comment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct HuginImageMeta {
    pub crop_factor: Option<Real>,
    pub auto_center_crop: Option<bool>,
    pub disabled: bool,
}

impl HuginImageMeta {
    pub fn parse(line: &str) -> Self {
        Self {
            crop_factor: param(line, "cropFactor="),
            auto_center_crop: param::<i32>(line, "autoCenterCrop=").map(|flag| flag != 0),
            disabled: line.split_whitespace().any(|t| t == "disabled"),
        }
    }
}

/// File name and size from a `#-imgfile w h "file"` comment.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ImgFileLine {
    pub width: u32,
    pub height: u32,
    pub filename: String,
}

impl ImgFileLine {
    pub fn parse(line: &str) -> Option<Self> {
        let rest = line.strip_prefix("#-imgfile")?.trim_start();
        let (width, rest) = rest.split_once(char::is_whitespace)?;
        let (height, rest) = rest.trim_start().split_once(char::is_whitespace)?;
        let filename = rest.trim().trim_matches('"');
        Some(Self {
            width: width.parse().ok()?,
            height: height.parse().ok()?,
            filename: filename.to_owned(),
        })
    }
}
