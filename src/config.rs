// Host-tunable knobs, deserialized with serde + ron.

use serde::Deserialize;

#[derive(Deserialize, Debug, Copy, Clone, PartialEq)]
pub struct Config {
    /// Number of generations the incremental GC keeps before a full
    /// collection is forced (spec.md §4.1/§4.4). Smaller values collect
    /// more eagerly at the cost of more frequent full traversals.
    pub gc_generations: usize,

    /// How many runnable threads the scheduler advances per call to
    /// `Interpreter::run_to_fixpoint` before re-polling I/O ports
    /// (spec.md §4.5).
    pub scheduler_step_budget: usize,

    /// 1-in-N chance that any given instruction dispatch records a
    /// profiling sample (spec.md §4.5 step 1). 0 disables sampling.
    pub profile_sample_rate: u32,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            gc_generations: 4,
            scheduler_step_budget: 64,
            profile_sample_rate: 0,
        }
    }
}

impl Config {
    pub fn from_ron_str(text: &str) -> Result<Config, ron::de::Error> {
        ron::de::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_sane() {
        let c = Config::default();
        assert!(c.gc_generations > 0);
        assert!(c.scheduler_step_budget > 0);
    }

    #[test]
    fn parses_from_ron() {
        let text = "(gc_generations: 8, scheduler_step_budget: 32, profile_sample_rate: 100)";
        let c = Config::from_ron_str(text).unwrap();
        assert_eq!(c.gc_generations, 8);
        assert_eq!(c.scheduler_step_budget, 32);
        assert_eq!(c.profile_sample_rate, 100);
    }
}
