// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Policies steering focal operations: no-data handling and the values halos are filled with.
use crate::shape::Offset;

/// How no-data is represented in an array.
///
/// A sentinel that is not equal to itself (a floating point NaN) matches every value that is not
/// equal to itself either.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
pub enum NoDataPolicy<T> {
    /// Every value is valid.
    #[default]
    None,
    /// Cells holding this value are no-data.
    Value(T),
}

impl<T: PartialEq> NoDataPolicy<T> {
    pub fn is_no_data(&self, value: &T) -> bool {
        match self {
            NoDataPolicy::None => false,
            #[allow(clippy::eq_op)]
            NoDataPolicy::Value(no_data) => {
                value == no_data || (no_data != no_data && value != value)
            }
        }
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            NoDataPolicy::None => None,
            NoDataPolicy::Value(no_data) => Some(no_data),
        }
    }

    /// Overwrites `value` with the no-data value, if there is one.
    pub fn mark_no_data(&self, value: &mut T)
    where
        T: Clone,
    {
        if let NoDataPolicy::Value(no_data) = self {
            *value = no_data.clone();
        }
    }
}

/// Values that halo cells take, per direction outside of the array.
///
/// Corners are the regions diagonally outside of the array, sides the regions straight north,
/// south, west or east of it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
pub struct HaloPolicy<T> {
    pub north_west: T,
    pub north: T,
    pub north_east: T,
    pub west: T,
    pub east: T,
    pub south_west: T,
    pub south: T,
    pub south_east: T,
}

impl<T: Clone> HaloPolicy<T> {
    /// The same fill value in every direction.
    pub fn uniform(value: T) -> Self {
        Self {
            north_west: value.clone(),
            north: value.clone(),
            north_east: value.clone(),
            west: value.clone(),
            east: value.clone(),
            south_west: value.clone(),
            south: value.clone(),
            south_east: value,
        }
    }

    pub fn with_corners(mut self, value: T) -> Self {
        self.north_west = value.clone();
        self.north_east = value.clone();
        self.south_west = value.clone();
        self.south_east = value;
        self
    }

    pub fn with_sides(mut self, value: T) -> Self {
        self.north = value.clone();
        self.south = value.clone();
        self.west = value.clone();
        self.east = value;
        self
    }
}

impl<T> HaloPolicy<T> {
    /// The fill value for the region at `direction` from the array. `direction` must point out
    /// of the array along at least one dimension.
    pub fn fill_value(&self, direction: Offset<2>) -> &T {
        match direction {
            [-1, -1] => &self.north_west,
            [-1, 1] => &self.north_east,
            [1, -1] => &self.south_west,
            [1, 1] => &self.south_east,
            [-1, _] => &self.north,
            [1, _] => &self.south,
            [_, -1] => &self.west,
            [_, 1] => &self.east,
            _ => panic!("direction {direction:?} does not point out of the array"),
        }
    }
}

/// Everything a focal operation needs to know besides the kernel and the function.
#[derive(Debug, Clone, PartialEq)]
pub struct FocalPolicies<T, U> {
    /// No-data in the input array. Aggregators skip input no-data.
    pub input_no_data: NoDataPolicy<T>,
    /// No-data in the output array. Aggregators without any valid input produce it.
    pub output_no_data: NoDataPolicy<U>,
    /// Values that stand in for cells outside of the input array.
    pub halo: HaloPolicy<T>,
}

impl<T: Clone, U> FocalPolicies<T, U> {
    /// No no-data handling; cells outside of the array take `fill_value`.
    pub fn with_fill_value(fill_value: T) -> Self {
        Self {
            input_no_data: NoDataPolicy::None,
            output_no_data: NoDataPolicy::None,
            halo: HaloPolicy::uniform(fill_value),
        }
    }

    /// No-data aware policies. Cells outside of the array are input no-data, so they do not
    /// contribute to any aggregate.
    pub fn with_no_data(input_no_data: T, output_no_data: U) -> Self {
        Self {
            input_no_data: NoDataPolicy::Value(input_no_data.clone()),
            output_no_data: NoDataPolicy::Value(output_no_data),
            halo: HaloPolicy::uniform(input_no_data),
        }
    }

    pub fn with_halo(mut self, halo: HaloPolicy<T>) -> Self {
        self.halo = halo;
        self
    }
}
