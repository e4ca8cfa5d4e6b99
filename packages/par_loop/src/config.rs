use itertools::iproduct;
use serde::Deserialize;

use crate::{
    CombineStrategy, Error, Result, RunConfig, Schedule, SchedulePolicy, validate_thread_count,
};

/// The parameter lists a benchmark sweep takes the cross-product of.
///
/// The defaults evaluate 1, 2, 4, 8 and 16 threads with chunk sizes 1, 4, 16, 32 and 64 under
/// every [`SchedulePolicy`] and every [`CombineStrategy`].
///
/// A sweep configuration can also be loaded from TOML. Omitted keys keep their defaults:
///
/// ```
/// use par_loop::{SchedulePolicy, SweepConfig};
///
/// let config = SweepConfig::from_toml_str(
///     r#"
///     thread_counts = [1, 2, 4]
///     policies = ["static", "guided"]
///     "#,
/// )
/// .unwrap();
///
/// assert_eq!(config.thread_counts(), [1, 2, 4]);
/// assert_eq!(config.policies(), [SchedulePolicy::Static, SchedulePolicy::Guided]);
/// assert_eq!(config.chunk_sizes(), [1, 4, 16, 32, 64]);
/// ```
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SweepConfig {
    thread_counts: Vec<usize>,
    policies: Vec<SchedulePolicy>,
    chunk_sizes: Vec<usize>,
    strategies: Vec<CombineStrategy>,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            thread_counts: vec![1, 2, 4, 8, 16],
            policies: SchedulePolicy::ALL.to_vec(),
            chunk_sizes: vec![1, 4, 16, 32, 64],
            strategies: CombineStrategy::ALL.to_vec(),
        }
    }
}

impl SweepConfig {
    /// Parses a sweep configuration from TOML text.
    ///
    /// The values are not validated here; see [`configurations()`](Self::configurations).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the text is not valid TOML or does not describe a sweep
    /// configuration.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Replaces the thread counts to evaluate.
    #[must_use]
    pub fn with_thread_counts(mut self, thread_counts: impl IntoIterator<Item = usize>) -> Self {
        self.thread_counts = thread_counts.into_iter().collect();
        self
    }

    /// Replaces the schedule policies to evaluate.
    #[must_use]
    pub fn with_policies(mut self, policies: impl IntoIterator<Item = SchedulePolicy>) -> Self {
        self.policies = policies.into_iter().collect();
        self
    }

    /// Replaces the chunk sizes to evaluate.
    #[must_use]
    pub fn with_chunk_sizes(mut self, chunk_sizes: impl IntoIterator<Item = usize>) -> Self {
        self.chunk_sizes = chunk_sizes.into_iter().collect();
        self
    }

    /// Replaces the combine strategies to evaluate.
    #[must_use]
    pub fn with_strategies(
        mut self,
        strategies: impl IntoIterator<Item = CombineStrategy>,
    ) -> Self {
        self.strategies = strategies.into_iter().collect();
        self
    }

    /// Thread counts to evaluate.
    #[must_use]
    pub fn thread_counts(&self) -> &[usize] {
        &self.thread_counts
    }

    /// Schedule policies to evaluate.
    #[must_use]
    pub fn policies(&self) -> &[SchedulePolicy] {
        &self.policies
    }

    /// Chunk sizes to evaluate.
    #[must_use]
    pub fn chunk_sizes(&self) -> &[usize] {
        &self.chunk_sizes
    }

    /// Combine strategies to evaluate.
    #[must_use]
    pub fn strategies(&self) -> &[CombineStrategy] {
        &self.strategies
    }

    /// Expands the cross-product into run configurations, validating every value.
    ///
    /// Thread count varies slowest, then policy, then chunk size; strategy varies fastest.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if any list is empty or contains a zero thread
    /// count or chunk size.
    pub fn configurations(&self) -> Result<Vec<RunConfig>> {
        let mut thread_counts = Vec::with_capacity(self.thread_counts.len());
        for &threads in &self.thread_counts {
            thread_counts.push(validate_thread_count(threads)?);
        }

        require_non_empty("thread_counts", &thread_counts)?;
        require_non_empty("policies", &self.policies)?;
        require_non_empty("chunk_sizes", &self.chunk_sizes)?;
        require_non_empty("strategies", &self.strategies)?;

        iproduct!(
            thread_counts,
            self.policies.iter().copied(),
            self.chunk_sizes.iter().copied(),
            self.strategies.iter().copied()
        )
        .map(|(threads, policy, chunk_size, strategy)| -> Result<RunConfig> {
            Ok(RunConfig::new(
                threads,
                Schedule::new(policy, chunk_size)?,
                strategy,
            ))
        })
        .collect()
    }
}

fn require_non_empty<T>(name: &str, values: &[T]) -> Result<()> {
    if values.is_empty() {
        return Err(Error::invalid(format!(
            "sweep list `{name}` must contain at least one value"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_sweep_has_lab_parameters() {
        let config = SweepConfig::default();

        assert_eq!(config.thread_counts(), [1, 2, 4, 8, 16]);
        assert_eq!(config.chunk_sizes(), [1, 4, 16, 32, 64]);
        assert_eq!(config.policies(), SchedulePolicy::ALL);
        assert_eq!(config.strategies(), CombineStrategy::ALL);
        assert_eq!(config.configurations().unwrap().len(), 5 * 3 * 5 * 3);
    }

    #[test]
    fn configurations_vary_strategy_fastest() {
        let config = SweepConfig::default()
            .with_thread_counts([1, 2])
            .with_policies([SchedulePolicy::Dynamic])
            .with_chunk_sizes([4, 8])
            .with_strategies([CombineStrategy::Atomic, CombineStrategy::CriticalSection]);

        let described: Vec<_> = config
            .configurations()
            .unwrap()
            .iter()
            .map(|c| (c.threads().get(), c.schedule().chunk_size().get(), c.strategy()))
            .collect();

        assert_eq!(
            described,
            vec![
                (1, 4, CombineStrategy::Atomic),
                (1, 4, CombineStrategy::CriticalSection),
                (1, 8, CombineStrategy::Atomic),
                (1, 8, CombineStrategy::CriticalSection),
                (2, 4, CombineStrategy::Atomic),
                (2, 4, CombineStrategy::CriticalSection),
                (2, 8, CombineStrategy::Atomic),
                (2, 8, CombineStrategy::CriticalSection),
            ]
        );
    }

    #[test]
    fn zero_values_are_invalid() {
        let zero_threads = SweepConfig::default().with_thread_counts([4, 0]);
        let zero_chunk = SweepConfig::default().with_chunk_sizes([0]);

        assert!(matches!(
            zero_threads.configurations(),
            Err(Error::InvalidConfiguration { .. })
        ));
        assert!(matches!(
            zero_chunk.configurations(),
            Err(Error::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn empty_lists_are_invalid() {
        let error = SweepConfig::default()
            .with_strategies([])
            .configurations()
            .unwrap_err();

        assert!(error.to_string().contains("strategies"), "{error}");
    }

    #[test]
    fn parses_every_key_from_toml() {
        let config = SweepConfig::from_toml_str(
            r#"
            thread_counts = [2]
            policies = ["dynamic"]
            chunk_sizes = [8, 32]
            strategies = ["reduction_merge", "critical_section"]
            "#,
        )
        .unwrap();

        assert_eq!(
            config,
            SweepConfig::default()
                .with_thread_counts([2])
                .with_policies([SchedulePolicy::Dynamic])
                .with_chunk_sizes([8, 32])
                .with_strategies([
                    CombineStrategy::ReductionMerge,
                    CombineStrategy::CriticalSection
                ])
        );
    }

    #[test]
    fn empty_toml_is_default() {
        assert_eq!(SweepConfig::from_toml_str("").unwrap(), SweepConfig::default());
    }

    #[test]
    fn unknown_keys_are_config_errors() {
        assert!(matches!(
            SweepConfig::from_toml_str("threads = [1]"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            SweepConfig::from_toml_str(r#"policies = ["round_robin"]"#),
            Err(Error::Config(_))
        ));
    }
}
