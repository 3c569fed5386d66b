use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::dataset::Dataset;
use crate::error::DashError;
use crate::schema::{controls, products};

/// Column the space and revenue views are grouped by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Dimension {
    #[default]
    ProductName,
    Category,
}

impl Dimension {
    pub const ALL: [Dimension; 2] = [Dimension::ProductName, Dimension::Category];

    pub fn column(self) -> &'static str {
        match self {
            Dimension::ProductName => products::PRODUCT_NAME,
            Dimension::Category => products::CATEGORY,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Dimension::ProductName => "Product Name",
            Dimension::Category => "Category",
        }
    }
}

impl FromStr for Dimension {
    type Err = DashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Dimension::ALL
            .into_iter()
            .find(|d| d.column() == s)
            .ok_or_else(|| DashError::UnknownSelectorValue {
                control: controls::DIMENSION.to_string(),
                value: s.to_string(),
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ControlId {
    Dimension,
    Category,
    Products,
}

impl ControlId {
    pub const ALL: [ControlId; 3] = [ControlId::Dimension, ControlId::Category, ControlId::Products];

    pub fn as_str(self) -> &'static str {
        match self {
            ControlId::Dimension => controls::DIMENSION,
            ControlId::Category => controls::CATEGORY,
            ControlId::Products => controls::PRODUCTS,
        }
    }
}

impl fmt::Display for ControlId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ControlId {
    type Err = DashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ControlId::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| DashError::UnknownControl(s.to_string()))
    }
}

/// Value held by a control: one option, or a (possibly empty) set of options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlValue {
    Single(String),
    Multi(Vec<String>),
}

impl fmt::Display for ControlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlValue::Single(v) => f.write_str(v),
            ControlValue::Multi(vs) => write!(f, "[{}]", vs.join(", ")),
        }
    }
}

/// A user changed one control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlEvent {
    pub control: ControlId,
    pub value: ControlValue,
}

impl ControlEvent {
    pub fn new(control: ControlId, value: ControlValue) -> Self {
        Self { control, value }
    }

    /// Build an event from wire identifiers.
    pub fn parse(control: &str, value: ControlValue) -> Result<Self, DashError> {
        Ok(Self::new(control.parse()?, value))
    }

    pub fn dimension(dimension: Dimension) -> Self {
        Self::new(
            ControlId::Dimension,
            ControlValue::Single(dimension.column().to_string()),
        )
    }

    pub fn category(category: impl Into<String>) -> Self {
        Self::new(ControlId::Category, ControlValue::Single(category.into()))
    }

    pub fn products<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            ControlId::Products,
            ControlValue::Multi(names.into_iter().map(Into::into).collect()),
        )
    }
}

/// Current value of every control in one session.
///
/// `products` always holds a subset of the options implied by `category`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorState {
    pub dimension: Dimension,
    pub category: String,
    pub products: Vec<String>,
}

impl SelectorState {
    /// Session defaults: first category alphabetically, no products.
    pub fn initial(dataset: &Dataset, dimension: Dimension) -> Self {
        Self {
            dimension,
            category: dataset.default_category().unwrap_or_default().to_string(),
            products: Vec::new(),
        }
    }

    pub fn get(&self, control: ControlId) -> ControlValue {
        match control {
            ControlId::Dimension => ControlValue::Single(self.dimension.column().to_string()),
            ControlId::Category => ControlValue::Single(self.category.clone()),
            ControlId::Products => ControlValue::Multi(self.products.clone()),
        }
    }

    /// Legal options for `control` under the current state.
    pub fn options(&self, control: ControlId, dataset: &Dataset) -> Vec<String> {
        match control {
            ControlId::Dimension => Dimension::ALL
                .iter()
                .map(|d| d.column().to_string())
                .collect(),
            ControlId::Category => dataset.categories().map(str::to_string).collect(),
            ControlId::Products => dataset.products_in(&self.category),
        }
    }

    /// Check `value` against the control's option set and write it.
    ///
    /// On error the state is left untouched. Duplicate products are dropped,
    /// keeping first-selection order.
    pub fn assign(
        &mut self,
        control: ControlId,
        value: &ControlValue,
        dataset: &Dataset,
    ) -> Result<(), DashError> {
        let rejected = |v: &str| DashError::UnknownSelectorValue {
            control: control.to_string(),
            value: v.to_string(),
        };

        match (control, value) {
            (ControlId::Dimension, ControlValue::Single(v)) => {
                self.dimension = v.parse()?;
            }
            (ControlId::Category, ControlValue::Single(v)) => {
                if !dataset.has_category(v) {
                    return Err(rejected(v));
                }
                self.category = v.clone();
            }
            (ControlId::Products, ControlValue::Multi(names)) => {
                let legal = dataset.products_in(&self.category);
                let mut selected: Vec<String> = Vec::with_capacity(names.len());
                for name in names {
                    if legal.binary_search(name).is_err() {
                        return Err(rejected(name));
                    }
                    if !selected.contains(name) {
                        selected.push(name.clone());
                    }
                }
                self.products = selected;
            }
            (_, other) => return Err(rejected(&other.to_string())),
        }
        Ok(())
    }

    /// Reset a cascade target: recompute its options and clear its value.
    ///
    /// Only `products` has options that depend on another control; the
    /// others keep their value. Returns the new option set.
    pub fn reset(&mut self, control: ControlId, dataset: &Dataset) -> Vec<String> {
        if control == ControlId::Products {
            self.products.clear();
        }
        self.options(control, dataset)
    }
}
