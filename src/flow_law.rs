//! Constitutive laws for the effective viscosity of ice.
use crate::config::FlowLawConfig;

/// Maps hardness and the second invariant of the strain rate to the effective viscosity.
pub trait FlowLaw {
    /// Returns the effective viscosity $\eta$ and its derivative $\partial \eta / \partial \gamma$
    /// for hardness $B$ and strain rate invariant $\gamma$.
    fn effective_viscosity(&self, hardness: f64, gamma: f64) -> (f64, f64);
}

/// Glen's flow law with Schoof-type regularization.
///
/// With $e = (1 - n) / (2n)$,
/// $$
/// \eta = \frac{1}{2} B (\gamma + \epsilon)^{e}, \qquad
/// \frac{\partial \eta}{\partial \gamma} = \frac{e \, \eta}{\gamma + \epsilon}.
/// $$
/// For $n = 1$ the viscosity does not depend on the strain rate.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct GlenFlowLaw {
    exponent: f64,
    regularization: f64,
}

impl GlenFlowLaw {
    pub fn new(exponent: f64, regularization: f64) -> Self {
        Self {
            exponent,
            regularization,
        }
    }

    pub fn exponent(&self) -> f64 {
        self.exponent
    }

    pub fn regularization(&self) -> f64 {
        self.regularization
    }
}

impl From<&FlowLawConfig> for GlenFlowLaw {
    fn from(config: &FlowLawConfig) -> Self {
        Self::new(config.exponent, config.regularization())
    }
}

impl FlowLaw for GlenFlowLaw {
    fn effective_viscosity(&self, hardness: f64, gamma: f64) -> (f64, f64) {
        let n = self.exponent;
        let e = (1.0 - n) / (2.0 * n);
        let gamma_reg = gamma + self.regularization;
        let eta = 0.5 * hardness * gamma_reg.powf(e);
        let deta = e * eta / gamma_reg;
        (eta, deta)
    }
}
