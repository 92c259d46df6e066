use std::collections::BTreeMap;

use super::fractal::Fractal;
use super::gaussian::Gaussian;
use super::{MarketError, MarketModel, MarketParams};

pub type MarketFactory = fn(&MarketParams) -> Result<Box<dyn MarketModel>, MarketError>;

/// Resolves a simulator name chosen at game creation to a market implementation.
///
/// The catalog is an ordinary value: build one with [SimulatorCatalog::builtin] and pass it to
/// whatever creates games. Tests can construct their own catalog with extra entries without
/// affecting anything else.
#[derive(Clone, Debug, Default)]
pub struct SimulatorCatalog {
    inner: BTreeMap<String, MarketFactory>,
}

impl SimulatorCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        catalog.register(Gaussian::NAME, Gaussian::boxed);
        catalog.register(Fractal::NAME, Fractal::boxed);
        catalog
    }

    pub fn register(&mut self, name: impl Into<String>, factory: MarketFactory) {
        self.inner.insert(name.into(), factory);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.inner.keys().cloned().collect()
    }

    pub fn build(
        &self,
        name: &str,
        params: &MarketParams,
    ) -> Result<Box<dyn MarketModel>, MarketError> {
        let factory = self
            .inner
            .get(name)
            .ok_or_else(|| MarketError::UnknownSimulator {
                name: name.to_string(),
            })?;
        factory(params)
    }
}

#[cfg(test)]
mod tests {
    use super::SimulatorCatalog;
    use crate::market::gaussian::Gaussian;
    use crate::market::{MarketError, MarketParams};

    #[test]
    fn test_that_builtin_catalog_resolves_simulators() {
        let catalog = SimulatorCatalog::builtin();
        assert_eq!(catalog.names(), vec!["fractal", "gaussian"]);

        let params = MarketParams::with_epochs(10);
        let market = catalog.build("gaussian", &params).unwrap();
        assert_eq!(market.name(), "gaussian");
        assert_eq!(market.epochs(), 10);

        let fractal = catalog.build("fractal", &params).unwrap();
        assert_eq!(fractal.name(), "fractal");
    }

    #[test]
    fn test_that_unknown_simulator_is_an_error() {
        let catalog = SimulatorCatalog::builtin();
        let res = catalog.build("brownian", &MarketParams::default());
        assert!(matches!(res, Err(MarketError::UnknownSimulator { .. })));
    }

    #[test]
    fn test_that_catalogs_are_independent() {
        let mut custom = SimulatorCatalog::new();
        custom.register("legacy", Gaussian::boxed);

        assert!(custom.contains("legacy"));
        assert!(!custom.contains("gaussian"));
        assert!(!SimulatorCatalog::builtin().contains("legacy"));
    }
}
