//! Fee schedule charged against resource consumers.

use std::fmt;

/// A cost charged to a resource consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Charge {
    cost: i32,
    label: &'static str,
}

impl Charge {
    pub const fn new(cost: i32, label: &'static str) -> Self {
        Self { cost, label }
    }

    pub fn cost(&self) -> i32 {
        self.cost
    }

    pub fn label(&self) -> &'static str {
        self.label
    }
}

impl fmt::Display for Charge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.label, self.cost)
    }
}

/// Default load type for every RPC request.
pub const FEE_REFERENCE_RPC: Charge = Charge::new(20, "reference RPC");
pub const FEE_LIGHT_RPC: Charge = Charge::new(5, "light RPC");
pub const FEE_LOW_BURDEN_RPC: Charge = Charge::new(20, "low RPC");
pub const FEE_MEDIUM_BURDEN_RPC: Charge = Charge::new(400, "medium RPC");
pub const FEE_HIGH_BURDEN_RPC: Charge = Charge::new(3000, "heavy RPC");
pub const FEE_INVALID_RPC: Charge = Charge::new(100, "malformed RPC");
pub const FEE_EXCEPTION_RPC: Charge = Charge::new(100, "exceptioned RPC");
