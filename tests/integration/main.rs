//! End-to-end scan scenarios against in-memory exchanges.

mod mock_exchange;
mod scan_scenarios;
