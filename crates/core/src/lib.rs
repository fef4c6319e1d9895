//! Core decomposition and load-imbalance injection for benchmark
//! experiment setup.
//!
//! The pipeline is: factor a process count into a balanced 3D grid
//! ([`factor`]), derive the missing piece of the domain geometry
//! ([`partition`]), optionally inject a deliberate load imbalance and place
//! particles ([`imbalance`]), and assemble the experiment directory
//! ([`experiment`]). Configuration mutation goes through the line-oriented
//! [`configdoc`] store.

pub mod configdoc;
pub mod experiment;
pub mod factor;
pub mod imbalance;
pub mod partition;

#[cfg(test)]
mod _tests_configdoc;
#[cfg(test)]
mod _tests_experiment;
#[cfg(test)]
mod _tests_factor;
#[cfg(test)]
mod _tests_partition;
