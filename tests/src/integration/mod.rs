//! Cross-crate block flows.

#[cfg(test)]
mod harness;
#[cfg(test)]
mod replay;
#[cfg(test)]
mod scenarios;
