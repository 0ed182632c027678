/// Long/short direction of a position or closed trade (§3).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Long,
    Short,
}

/// The book's current open position. Size is unsigned; direction carries
/// the sign (§4.7).
#[derive(Clone, Copy, Debug, Default)]
pub struct Position {
    pub size: f64,
    pub average_price: f64,
    pub direction: Option<Direction>,
}

impl Position {
    pub fn is_flat(&self) -> bool {
        self.size == 0.0
    }
}

/// A closed (or force-closed) trade (§3).
#[derive(Clone, Debug)]
pub struct Trade {
    pub id: String,
    pub entry_time: i64,
    pub entry_price: f64,
    pub exit_time: i64,
    pub exit_price: f64,
    pub quantity: f64,
    pub pnl: f64,
    pub direction: Direction,
}

/// Position, cash, and trade ledger (§4.7). `entry` closes an opposing
/// position first; `close`/`close_all` realize PnL and reset to flat.
#[derive(Default)]
pub struct Strategy {
    pub position: Position,
    pub cash: f64,
    pub trades: Vec<Trade>,
    current_id: String,
    entry_time: i64,
}

impl Strategy {
    pub fn new(initial_cash: f64) -> Self {
        Self {
            cash: initial_cash,
            ..Default::default()
        }
    }

    /// Open or add to a position, closing an opposing one first. Entry
    /// price is weighted-averaged across adds to the same side (§4.7).
    pub fn entry(&mut self, id: &str, direction: Direction, quantity: f64, price: f64, time: i64) {
        tracing::debug!(id, ?direction, quantity, price, time, "strategy entry");
        if let Some(existing) = self.position.direction {
            if existing != direction && !self.position.is_flat() {
                self.close(price, time);
            }
        }

        let delta = quantity.abs();
        if self.position.is_flat() {
            self.position.size = delta;
            self.position.average_price = price;
            self.position.direction = Some(direction);
            self.current_id = id.to_string();
            self.entry_time = time;
        } else {
            let new_size = self.position.size + delta;
            self.position.average_price =
                (self.position.size * self.position.average_price + delta * price) / new_size;
            self.position.size = new_size;
        }
    }

    /// Close the open position at `price`, recording a trade and
    /// crediting realized PnL to cash.
    pub fn close(&mut self, price: f64, time: i64) {
        if self.position.is_flat() {
            return;
        }
        let direction = self.position.direction.unwrap();
        let size = self.position.size;
        let entry_price = self.position.average_price;
        let pnl = match direction {
            Direction::Long => (price - entry_price) * size,
            Direction::Short => (entry_price - price) * size,
        };
        tracing::debug!(
            id = %self.current_id,
            ?direction,
            size,
            entry_price,
            exit_price = price,
            pnl,
            "strategy close"
        );
        self.trades.push(Trade {
            id: self.current_id.clone(),
            entry_time: self.entry_time,
            entry_price,
            exit_time: time,
            exit_price: price,
            quantity: size,
            pnl,
            direction,
        });
        self.cash += pnl;
        self.position = Position::default();
    }

    pub fn close_all(&mut self, price: f64, time: i64) {
        self.close(price, time);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_then_close_realizes_pnl_long() {
        let mut s = Strategy::new(1000.0);
        s.entry("t1", Direction::Long, 10.0, 100.0, 0);
        s.close(110.0, 1);
        assert_eq!(s.trades.len(), 1);
        assert_eq!(s.trades[0].pnl, 100.0);
        assert_eq!(s.cash, 1100.0);
        assert!(s.position.is_flat());
    }

    #[test]
    fn entry_then_close_realizes_pnl_short() {
        let mut s = Strategy::new(1000.0);
        s.entry("t1", Direction::Short, 10.0, 100.0, 0);
        s.close(90.0, 1);
        assert_eq!(s.trades[0].pnl, 100.0);
        assert_eq!(s.cash, 1100.0);
    }

    #[test]
    fn opposing_entry_closes_existing_position_first() {
        let mut s = Strategy::new(1000.0);
        s.entry("t1", Direction::Long, 10.0, 100.0, 0);
        s.entry("t2", Direction::Short, 5.0, 120.0, 1);
        assert_eq!(s.trades.len(), 1);
        assert_eq!(s.trades[0].pnl, 200.0);
        assert_eq!(s.position.direction, Some(Direction::Short));
        assert_eq!(s.position.size, 5.0);
    }

    #[test]
    fn same_direction_entry_weight_averages_price() {
        let mut s = Strategy::new(1000.0);
        s.entry("t1", Direction::Long, 10.0, 100.0, 0);
        s.entry("t1", Direction::Long, 10.0, 200.0, 1);
        assert_eq!(s.position.size, 20.0);
        assert_eq!(s.position.average_price, 150.0);
    }
}
