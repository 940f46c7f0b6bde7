// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Focal functions and the aggregators that compute them.
//!
//! For every output cell, the engine creates a fresh [`Aggregator`] through
//! [`FocalFunction::aggregator`], calls [`Aggregator::add`] once for every participating kernel
//! cell, in row-major kernel order, and stores the result of [`Aggregator::finish`]. Values
//! coming from outside of the array are the halo fill values; aggregators treat them like any
//! other input value.
//!
//! All built-in aggregators skip input no-data and produce output no-data when no valid input
//! was added. Without an output no-data value they fall back to a neutral value instead (zero
//! for sums and counts, NaN for means, the default value otherwise).
use super::{kernel::Weight, policy::FocalPolicies};
use crate::{focal::NoDataPolicy, partition::Element};
use std::{collections::BTreeMap, marker::PhantomData, ops::Add};

/// Folds the values within one kernel footprint into an output value.
pub trait Aggregator<W, T> {
    type Output;

    fn add(&mut self, weight: &W, value: &T);

    fn finish(self) -> Self::Output;
}

/// A function computed over the kernel footprint of every cell.
pub trait FocalFunction<W, T>: Send + Sync + 'static {
    type Output: Element;
    type Aggregator: Aggregator<W, T, Output = Self::Output>;

    /// A fresh aggregator for one output cell.
    fn aggregator(&self, policies: &FocalPolicies<T, Self::Output>) -> Self::Aggregator;
}

/// Skips input no-data and maps "nothing added" onto output no-data.
#[derive(Debug, Clone)]
struct NoDataFilter<T, U> {
    input: NoDataPolicy<T>,
    output: NoDataPolicy<U>,
}

impl<T: Clone + PartialEq, U: Clone + PartialEq> NoDataFilter<T, U> {
    fn new(policies: &FocalPolicies<T, U>) -> Self {
        Self {
            input: policies.input_no_data.clone(),
            output: policies.output_no_data.clone(),
        }
    }

    fn accepts(&self, value: &T) -> bool {
        !self.input.is_no_data(value)
    }

    fn empty(&self, fallback: impl FnOnce() -> U) -> U {
        self.output.value().cloned().unwrap_or_else(fallback)
    }
}

macro_rules! stateless_function {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default)]
        pub struct $name;
    };
}

stateless_function!(
    /// Sum of the valid values.
    Sum
);
stateless_function!(
    /// Arithmetic mean of the valid values.
    Mean
);
stateless_function!(
    /// Smallest valid value.
    Minimum
);
stateless_function!(
    /// Largest valid value.
    Maximum
);
stateless_function!(
    /// Most frequent valid value. Ties go to the smallest value.
    Majority
);
stateless_function!(
    /// Number of distinct valid values.
    Diversity
);
stateless_function!(
    /// The value of the only participating cell. Meant for
    /// [`Kernel::center`](super::Kernel::center) kernels.
    Center
);

pub struct SumAggregator<T> {
    filter: NoDataFilter<T, T>,
    sum: Option<T>,
}

impl<W, T> Aggregator<W, T> for SumAggregator<T>
where
    T: Element + PartialEq + Default + Add<Output = T>,
{
    type Output = T;

    fn add(&mut self, _weight: &W, value: &T) {
        if self.filter.accepts(value) {
            self.sum = Some(match self.sum.take() {
                Some(sum) => sum + value.clone(),
                None => value.clone(),
            });
        }
    }

    fn finish(self) -> T {
        match self.sum {
            Some(sum) => sum,
            None => self.filter.empty(T::default),
        }
    }
}

impl<W: Weight, T> FocalFunction<W, T> for Sum
where
    T: Element + PartialEq + Default + Add<Output = T>,
{
    type Output = T;
    type Aggregator = SumAggregator<T>;

    fn aggregator(&self, policies: &FocalPolicies<T, T>) -> SumAggregator<T> {
        SumAggregator {
            filter: NoDataFilter::new(policies),
            sum: None,
        }
    }
}

pub struct MeanAggregator<T> {
    filter: NoDataFilter<T, f64>,
    sum: f64,
    count: usize,
}

impl<W, T> Aggregator<W, T> for MeanAggregator<T>
where
    T: Element + PartialEq + Into<f64>,
{
    type Output = f64;

    fn add(&mut self, _weight: &W, value: &T) {
        if self.filter.accepts(value) {
            self.sum += value.clone().into();
            self.count += 1;
        }
    }

    fn finish(self) -> f64 {
        if self.count == 0 {
            self.filter.empty(|| f64::NAN)
        } else {
            self.sum / self.count as f64
        }
    }
}

impl<W: Weight, T> FocalFunction<W, T> for Mean
where
    T: Element + PartialEq + Into<f64>,
{
    type Output = f64;
    type Aggregator = MeanAggregator<T>;

    fn aggregator(&self, policies: &FocalPolicies<T, f64>) -> MeanAggregator<T> {
        MeanAggregator {
            filter: NoDataFilter::new(policies),
            sum: 0.0,
            count: 0,
        }
    }
}

/// Keeps the valid value that compares best according to `Better`.
pub struct ExtremeAggregator<T, Better> {
    filter: NoDataFilter<T, T>,
    extreme: Option<T>,
    _better: PhantomData<fn() -> Better>,
}

pub trait Prefer<T> {
    fn better(candidate: &T, current: &T) -> bool;
}

pub struct Less;
pub struct Greater;

impl<T: PartialOrd> Prefer<T> for Less {
    fn better(candidate: &T, current: &T) -> bool {
        candidate < current
    }
}

impl<T: PartialOrd> Prefer<T> for Greater {
    fn better(candidate: &T, current: &T) -> bool {
        candidate > current
    }
}

impl<W, T, Better> Aggregator<W, T> for ExtremeAggregator<T, Better>
where
    T: Element + PartialEq + Default,
    Better: Prefer<T>,
{
    type Output = T;

    fn add(&mut self, _weight: &W, value: &T) {
        if !self.filter.accepts(value) {
            return;
        }
        match &self.extreme {
            Some(current) if !Better::better(value, current) => {}
            _ => self.extreme = Some(value.clone()),
        }
    }

    fn finish(self) -> T {
        match self.extreme {
            Some(extreme) => extreme,
            None => self.filter.empty(T::default),
        }
    }
}

impl<W: Weight, T> FocalFunction<W, T> for Minimum
where
    T: Element + PartialOrd + Default,
{
    type Output = T;
    type Aggregator = ExtremeAggregator<T, Less>;

    fn aggregator(&self, policies: &FocalPolicies<T, T>) -> Self::Aggregator {
        ExtremeAggregator {
            filter: NoDataFilter::new(policies),
            extreme: None,
            _better: PhantomData,
        }
    }
}

impl<W: Weight, T> FocalFunction<W, T> for Maximum
where
    T: Element + PartialOrd + Default,
{
    type Output = T;
    type Aggregator = ExtremeAggregator<T, Greater>;

    fn aggregator(&self, policies: &FocalPolicies<T, T>) -> Self::Aggregator {
        ExtremeAggregator {
            filter: NoDataFilter::new(policies),
            extreme: None,
            _better: PhantomData,
        }
    }
}

/// Counts occurrences of every valid value.
pub struct FrequencyAggregator<T, U> {
    filter: NoDataFilter<T, U>,
    frequencies: BTreeMap<T, usize>,
}

impl<T: Ord, U> FrequencyAggregator<T, U> {
    fn count(&mut self, value: &T)
    where
        T: Clone + PartialEq,
        U: Clone + PartialEq,
    {
        if self.filter.accepts(value) {
            *self.frequencies.entry(value.clone()).or_default() += 1;
        }
    }
}

pub struct MajorityAggregator<T>(FrequencyAggregator<T, T>);

impl<W, T> Aggregator<W, T> for MajorityAggregator<T>
where
    T: Element + Ord + Default,
{
    type Output = T;

    fn add(&mut self, _weight: &W, value: &T) {
        self.0.count(value);
    }

    fn finish(self) -> T {
        let FrequencyAggregator {
            filter,
            frequencies,
        } = self.0;
        let mut majority: Option<(T, usize)> = None;
        // ascending key order, and only strictly larger counts replace the current majority
        for (value, frequency) in frequencies {
            if majority
                .as_ref()
                .is_none_or(|(_, majority_frequency)| frequency > *majority_frequency)
            {
                majority = Some((value, frequency));
            }
        }
        match majority {
            Some((value, _)) => value,
            None => filter.empty(T::default),
        }
    }
}

impl<W: Weight, T> FocalFunction<W, T> for Majority
where
    T: Element + Ord + Default,
{
    type Output = T;
    type Aggregator = MajorityAggregator<T>;

    fn aggregator(&self, policies: &FocalPolicies<T, T>) -> Self::Aggregator {
        MajorityAggregator(FrequencyAggregator {
            filter: NoDataFilter::new(policies),
            frequencies: BTreeMap::new(),
        })
    }
}

pub struct DiversityAggregator<T>(FrequencyAggregator<T, u64>);

impl<W, T> Aggregator<W, T> for DiversityAggregator<T>
where
    T: Element + Ord,
{
    type Output = u64;

    fn add(&mut self, _weight: &W, value: &T) {
        self.0.count(value);
    }

    fn finish(self) -> u64 {
        let FrequencyAggregator {
            filter,
            frequencies,
        } = self.0;
        if frequencies.is_empty() {
            filter.empty(|| 0)
        } else {
            frequencies.len() as u64
        }
    }
}

impl<W: Weight, T> FocalFunction<W, T> for Diversity
where
    T: Element + Ord,
{
    type Output = u64;
    type Aggregator = DiversityAggregator<T>;

    fn aggregator(&self, policies: &FocalPolicies<T, u64>) -> Self::Aggregator {
        DiversityAggregator(FrequencyAggregator {
            filter: NoDataFilter::new(policies),
            frequencies: BTreeMap::new(),
        })
    }
}

pub struct CenterAggregator<T> {
    filter: NoDataFilter<T, T>,
    value: Option<T>,
}

impl<W, T> Aggregator<W, T> for CenterAggregator<T>
where
    T: Element + PartialEq + Default,
{
    type Output = T;

    fn add(&mut self, _weight: &W, value: &T) {
        debug_assert!(self.value.is_none(), "more than one cell participates");
        if self.filter.accepts(value) {
            self.value = Some(value.clone());
        }
    }

    fn finish(self) -> T {
        match self.value {
            Some(value) => value,
            None => self.filter.empty(T::default),
        }
    }
}

impl<W: Weight, T> FocalFunction<W, T> for Center
where
    T: Element + PartialEq + Default,
{
    type Output = T;
    type Aggregator = CenterAggregator<T>;

    fn aggregator(&self, policies: &FocalPolicies<T, T>) -> Self::Aggregator {
        CenterAggregator {
            filter: NoDataFilter::new(policies),
            value: None,
        }
    }
}
