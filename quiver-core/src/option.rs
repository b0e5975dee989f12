//! Solver options.
//!
//! Options form a fixed enumeration with typed values. Setting a numeric
//! option outside its declared range is a programmer error; using an unknown
//! option name is a user error; an unknown SAT-solver name silently falls
//! back to the default oracle.

use std::fmt;

use crate::error::{Error, Result};

/// Synthesis mode of the quantifier module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SynthMode {
    /// No term synthesis; counterexample models only.
    None,
    /// Enumerative learning over input/output examples.
    El,
    /// Enumerative learning restricted to constraints in the cone of the
    /// existential variable.
    Elmc,
    /// Enumerative learning restricted to the full formula as constraint.
    Elmr,
    /// Try EL first, fall back to ELMC.
    #[default]
    ElElmc,
}

impl SynthMode {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(SynthMode::None),
            "el" => Some(SynthMode::El),
            "elmc" => Some(SynthMode::Elmc),
            "elmr" => Some(SynthMode::Elmr),
            "el_elmc" => Some(SynthMode::ElElmc),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            SynthMode::None => "none",
            SynthMode::El => "el",
            SynthMode::Elmc => "elmc",
            SynthMode::Elmr => "elmr",
            SynthMode::ElElmc => "el_elmc",
        }
    }
}

impl fmt::Display for SynthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-pass enable flags for the preprocessing pipeline.
#[derive(Debug, Clone)]
pub struct PassEnables {
    pub rewrite: bool,
    pub contradicting_ands: bool,
    pub elim_lambda: bool,
    pub elim_uninterpreted: bool,
    pub embedded_constraints: bool,
    pub variable_substitution: bool,
    pub flatten_and: bool,
    pub skeleton_preproc: bool,
    pub normalize: bool,
}

impl Default for PassEnables {
    fn default() -> Self {
        Self {
            rewrite: true,
            contradicting_ands: true,
            elim_lambda: true,
            elim_uninterpreted: true,
            embedded_constraints: true,
            variable_substitution: true,
            flatten_and: true,
            skeleton_preproc: true,
            normalize: true,
        }
    }
}

/// Solver configuration.
#[derive(Debug, Clone)]
pub struct Options {
    pub produce_models: bool,
    pub produce_unsat_cores: bool,
    pub incremental: bool,
    /// Aggressiveness of the pure rewriter, 0 (off) ..= 3 (speculative).
    pub rewrite_level: u8,
    /// Name of the SAT oracle. Unknown names fall back to the default.
    pub sat_solver: String,
    pub seed: u64,
    pub verbosity: u8,
    pub quant_synth: SynthMode,
    /// Base synthesis budget per existential variable.
    pub quant_synth_limit: u64,
    /// Synthesize quantifier instantiations as extra E-solver lemmas.
    pub quant_synth_qi: bool,
    pub quant_dual_solver: bool,
    pub quant_miniscope: bool,
    pub quant_der: bool,
    pub quant_cer: bool,
    /// Share-aware leaf detection in the normalizer.
    pub normalize_share_aware: bool,
    pub passes: PassEnables,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            produce_models: false,
            produce_unsat_cores: false,
            incremental: false,
            rewrite_level: 2,
            sat_solver: "varisat".to_string(),
            seed: 0,
            verbosity: 0,
            quant_synth: SynthMode::default(),
            quant_synth_limit: 10_000,
            quant_synth_qi: false,
            quant_dual_solver: false,
            quant_miniscope: true,
            quant_der: true,
            quant_cer: false,
            normalize_share_aware: true,
            passes: PassEnables::default(),
        }
    }
}

/// A typed option value, used by the string-keyed interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    Bool(bool),
    Num(u64),
    Str(String),
    Mode(SynthMode),
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    fn range_check(name: &'static str, value: u64, min: u64, max: u64) -> Result<u64> {
        if value < min || value > max {
            Err(Error::OptionOutOfRange { option: name, value, min, max })
        } else {
            Ok(value)
        }
    }

    fn expect_bool(name: &str, value: &OptionValue) -> Result<bool> {
        match value {
            OptionValue::Bool(b) => Ok(*b),
            OptionValue::Num(n) if *n <= 1 => Ok(*n == 1),
            _ => Err(Error::UnknownOption(format!("{name}: expected a Boolean value"))),
        }
    }

    fn expect_num(name: &str, value: &OptionValue) -> Result<u64> {
        match value {
            OptionValue::Num(n) => Ok(*n),
            _ => Err(Error::UnknownOption(format!("{name}: expected a numeric value"))),
        }
    }

    /// Set an option by name. Unknown names are user errors.
    pub fn set(&mut self, name: &str, value: OptionValue) -> Result<()> {
        match name {
            "produce-models" => self.produce_models = Self::expect_bool(name, &value)?,
            "produce-unsat-cores" => self.produce_unsat_cores = Self::expect_bool(name, &value)?,
            "incremental" => self.incremental = Self::expect_bool(name, &value)?,
            "rewrite-level" => {
                let v = Self::range_check("rewrite-level", Self::expect_num(name, &value)?, 0, 3)?;
                self.rewrite_level = v as u8;
            }
            "sat-solver" => {
                // unknown engines silently fall back to the default oracle
                match value {
                    OptionValue::Str(s) if s == "varisat" => self.sat_solver = s,
                    OptionValue::Str(_) => self.sat_solver = "varisat".to_string(),
                    _ => return Err(Error::UnknownOption(format!("{name}: expected a name"))),
                }
            }
            "seed" => self.seed = Self::expect_num(name, &value)?,
            "verbosity" => {
                let v = Self::range_check("verbosity", Self::expect_num(name, &value)?, 0, 4)?;
                self.verbosity = v as u8;
            }
            "quant-synth" => match value {
                OptionValue::Mode(m) => self.quant_synth = m,
                OptionValue::Str(s) => {
                    self.quant_synth = SynthMode::parse(&s)
                        .ok_or_else(|| Error::UnknownOption(format!("quant-synth mode {s:?}")))?;
                }
                _ => return Err(Error::UnknownOption(format!("{name}: expected a mode"))),
            },
            "quant-synth-limit" => {
                let v = Self::range_check(
                    "quant-synth-limit",
                    Self::expect_num(name, &value)?,
                    1,
                    u64::MAX,
                )?;
                self.quant_synth_limit = v;
            }
            "quant-synth-qi" => self.quant_synth_qi = Self::expect_bool(name, &value)?,
            "quant-dual-solver" => self.quant_dual_solver = Self::expect_bool(name, &value)?,
            "quant-miniscope" => self.quant_miniscope = Self::expect_bool(name, &value)?,
            "quant-der" => self.quant_der = Self::expect_bool(name, &value)?,
            "quant-cer" => self.quant_cer = Self::expect_bool(name, &value)?,
            "preprocess.normalize.share-aware" => {
                self.normalize_share_aware = Self::expect_bool(name, &value)?;
            }
            "preprocess.rewrite" => self.passes.rewrite = Self::expect_bool(name, &value)?,
            "preprocess.contradicting-ands" => {
                self.passes.contradicting_ands = Self::expect_bool(name, &value)?;
            }
            "preprocess.elim-lambda" => self.passes.elim_lambda = Self::expect_bool(name, &value)?,
            "preprocess.elim-uninterpreted" => {
                self.passes.elim_uninterpreted = Self::expect_bool(name, &value)?;
            }
            "preprocess.embedded-constraints" => {
                self.passes.embedded_constraints = Self::expect_bool(name, &value)?;
            }
            "preprocess.variable-substitution" => {
                self.passes.variable_substitution = Self::expect_bool(name, &value)?;
            }
            "preprocess.flatten-and" => self.passes.flatten_and = Self::expect_bool(name, &value)?,
            "preprocess.skeleton-preproc" => {
                self.passes.skeleton_preproc = Self::expect_bool(name, &value)?;
            }
            "preprocess.normalize" => self.passes.normalize = Self::expect_bool(name, &value)?,
            _ => return Err(Error::UnknownOption(name.to_string())),
        }
        Ok(())
    }

    /// Get an option by name.
    pub fn get(&self, name: &str) -> Result<OptionValue> {
        let v = match name {
            "produce-models" => OptionValue::Bool(self.produce_models),
            "produce-unsat-cores" => OptionValue::Bool(self.produce_unsat_cores),
            "incremental" => OptionValue::Bool(self.incremental),
            "rewrite-level" => OptionValue::Num(u64::from(self.rewrite_level)),
            "sat-solver" => OptionValue::Str(self.sat_solver.clone()),
            "seed" => OptionValue::Num(self.seed),
            "verbosity" => OptionValue::Num(u64::from(self.verbosity)),
            "quant-synth" => OptionValue::Mode(self.quant_synth),
            "quant-synth-limit" => OptionValue::Num(self.quant_synth_limit),
            "quant-synth-qi" => OptionValue::Bool(self.quant_synth_qi),
            "quant-dual-solver" => OptionValue::Bool(self.quant_dual_solver),
            "quant-miniscope" => OptionValue::Bool(self.quant_miniscope),
            "quant-der" => OptionValue::Bool(self.quant_der),
            "quant-cer" => OptionValue::Bool(self.quant_cer),
            "preprocess.normalize.share-aware" => OptionValue::Bool(self.normalize_share_aware),
            _ => return Err(Error::UnknownOption(name.to_string())),
        };
        Ok(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_round_trip() {
        let mut opts = Options::new();
        opts.set("produce-models", OptionValue::Bool(true)).unwrap();
        assert_eq!(opts.get("produce-models").unwrap(), OptionValue::Bool(true));
        opts.set("rewrite-level", OptionValue::Num(3)).unwrap();
        assert_eq!(opts.rewrite_level, 3);
        opts.set("quant-synth", OptionValue::Str("elmr".into())).unwrap();
        assert_eq!(opts.quant_synth, SynthMode::Elmr);
    }

    #[test]
    fn range_violations_are_errors() {
        let mut opts = Options::new();
        assert!(matches!(
            opts.set("rewrite-level", OptionValue::Num(4)),
            Err(Error::OptionOutOfRange { .. })
        ));
        assert!(matches!(
            opts.set("verbosity", OptionValue::Num(9)),
            Err(Error::OptionOutOfRange { .. })
        ));
    }

    #[test]
    fn unknown_names_are_user_errors() {
        let mut opts = Options::new();
        assert!(matches!(
            opts.set("no-such-option", OptionValue::Bool(true)),
            Err(Error::UnknownOption(_))
        ));
        assert!(matches!(opts.get("no-such-option"), Err(Error::UnknownOption(_))));
    }

    #[test]
    fn unknown_sat_solver_falls_back() {
        let mut opts = Options::new();
        opts.set("sat-solver", OptionValue::Str("kissat".into())).unwrap();
        assert_eq!(opts.sat_solver, "varisat");
    }
}
