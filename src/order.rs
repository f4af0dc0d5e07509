use serde::{Deserialize, Serialize};

pub const LIGHT: &str = "light";
pub const ALE: &str = "ale";

/// A unit of work waiting to be served.
///
/// `magnitude` is the number of time units serving the order takes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Order {
    category: String,
    magnitude: u32,
}

impl Order {
    pub fn new<C>(category: C, magnitude: u32) -> Self
    where
        C: Into<String>,
    {
        Self {
            category: category.into(),
            magnitude,
        }
    }

    pub fn light(magnitude: u32) -> Self {
        Self::new(LIGHT, magnitude)
    }

    pub fn ale(magnitude: u32) -> Self {
        Self::new(ALE, magnitude)
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn magnitude(&self) -> u32 {
        self.magnitude
    }
}

/// Deterministic order stream driven by an increasing tick.
///
/// Tick `l` yields magnitude `l % 5` and category `ale` for even ticks,
/// `light` for odd ones.
#[derive(Debug, Clone, Default)]
pub struct OrderGenerator {
    tick: u64,
}

impl OrderGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(tick: u64) -> Self {
        Self { tick }
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }
}

impl Iterator for OrderGenerator {
    type Item = Order;

    fn next(&mut self) -> Option<Order> {
        let order = order_for_tick(self.tick);
        self.tick = self.tick.wrapping_add(1);
        Some(order)
    }
}

pub fn order_for_tick(tick: u64) -> Order {
    let magnitude = (tick % 5) as u32;
    let category = if tick % 2 == 0 { ALE } else { LIGHT };
    Order::new(category, magnitude)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generator_cycles_magnitude_and_alternates_category() {
        let orders: Vec<Order> = OrderGenerator::new().take(6).collect();

        assert_eq!(
            orders,
            vec![
                Order::ale(0),
                Order::light(1),
                Order::ale(2),
                Order::light(3),
                Order::ale(4),
                Order::light(0),
            ]
        );
    }

    #[test]
    fn generator_resumes_from_tick() {
        let mut generator = OrderGenerator::starting_at(7);
        assert_eq!(generator.next(), Some(Order::light(2)));
        assert_eq!(generator.tick(), 8);
    }

    #[test]
    fn order_serializes_with_named_fields() {
        let json = serde_json::to_value(Order::ale(3)).expect("serialize order");
        assert_eq!(json, serde_json::json!({ "category": "ale", "magnitude": 3 }));
    }
}
