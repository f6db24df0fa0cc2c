//! Registry of counter tables, one per (family, granularity) pair.

use serde::Serialize;

use crate::counters::granularity::{Granularity, GRANULARITIES};
use crate::counters::models::{CounterFamily, FAMILIES};

/// Handle on the table backing one family at one granularity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CounterTable {
    pub family: CounterFamily,
    pub granularity: Granularity,
    pub name: String,
}

impl CounterTable {
    fn new(family: CounterFamily, granularity: Granularity) -> Self {
        Self {
            family,
            granularity,
            name: format!("{}_{}_bucket", family.as_str(), granularity.as_str()),
        }
    }
}

/// All counter tables, built once at start-up and shared by the store,
/// the recorder and the aggregator.
#[derive(Debug, Clone)]
pub struct CounterTables {
    tables: Vec<CounterTable>,
}

impl CounterTables {
    pub fn new() -> Self {
        let tables = FAMILIES
            .into_iter()
            .flat_map(|family| {
                GRANULARITIES
                    .into_iter()
                    .map(move |granularity| CounterTable::new(family, granularity))
            })
            .collect();

        Self { tables }
    }

    pub fn get(&self, family: CounterFamily, granularity: Granularity) -> &CounterTable {
        let family_index = match family {
            CounterFamily::Conversions => 0,
            CounterFamily::Impressions => 1,
            CounterFamily::VariantConversions => 2,
        };
        let granularity_index = match granularity {
            Granularity::All => 0,
            Granularity::Week => 1,
            Granularity::Day => 2,
            Granularity::Hour => 3,
        };

        &self.tables[family_index * GRANULARITIES.len() + granularity_index]
    }

    /// Tables of one family, in [`GRANULARITIES`] order.
    pub fn for_family(&self, family: CounterFamily) -> impl Iterator<Item = &CounterTable> {
        self.tables.iter().filter(move |t| t.family == family)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CounterTable> {
        self.tables.iter()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

impl Default for CounterTables {
    fn default() -> Self {
        Self::new()
    }
}
