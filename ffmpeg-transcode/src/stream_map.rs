use std::collections::HashSet;

use crate::error::{Result, TranscodeError};
use crate::format::{ContainerId, OutputStreamRef};

/// Routing table from input stream index to the output streams it feeds.
///
/// Immutable once built. Routes keep declaration order, and so do the output
/// streams of each route.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamMap {
    routes: Vec<(usize, Vec<OutputStreamRef>)>,
}

impl StreamMap {
    pub fn builder() -> StreamMapBuilder {
        StreamMapBuilder::default()
    }

    /// Build from `(input index, output)` declarations.
    pub fn build(declarations: impl IntoIterator<Item = (usize, OutputStreamRef)>) -> Result<Self> {
        declarations
            .into_iter()
            .fold(Self::builder(), |builder, (input, output)| builder.route(input, output))
            .build()
    }

    /// Output streams fed by input stream `index`; empty when unmapped.
    pub fn outputs_for(&self, index: usize) -> &[OutputStreamRef] {
        self.routes
            .iter()
            .find(|(input, _)| *input == index)
            .map(|(_, outputs)| outputs.as_slice())
            .unwrap_or(&[])
    }

    pub fn contains(&self, index: usize) -> bool {
        self.routes.iter().any(|(input, _)| *input == index)
    }

    pub fn input_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.routes.iter().map(|(input, _)| *input)
    }

    /// Every (input, output) pair in declaration order.
    pub fn routes(&self) -> impl Iterator<Item = (usize, OutputStreamRef)> + '_ {
        self.routes
            .iter()
            .flat_map(|(input, outputs)| outputs.iter().map(move |output| (*input, *output)))
    }

    /// Distinct output containers, in the order the routes first mention them.
    pub fn output_containers(&self) -> Vec<ContainerId> {
        let mut seen = HashSet::new();
        self.routes()
            .map(|(_, output)| output.container)
            .filter(|container| seen.insert(*container))
            .collect()
    }
}

#[derive(Debug, Default)]
pub struct StreamMapBuilder {
    routes: Vec<(usize, Vec<OutputStreamRef>)>,
}

impl StreamMapBuilder {
    pub fn route(mut self, input: usize, output: OutputStreamRef) -> Self {
        match self.routes.iter_mut().find(|(index, _)| *index == input) {
            Some((_, outputs)) => outputs.push(output),
            None => self.routes.push((input, vec![output])),
        }
        self
    }

    pub fn build(self) -> Result<StreamMap> {
        if self.routes.is_empty() {
            return Err(TranscodeError::configuration("stream map has no routes"));
        }
        let mut fed = HashSet::new();
        for (input, outputs) in &self.routes {
            for output in outputs {
                if !fed.insert(*output) {
                    return Err(TranscodeError::configuration(format!(
                        "output stream {output} is fed by more than one route (again from input {input})"
                    )));
                }
            }
        }
        Ok(StreamMap {
            routes: self.routes,
        })
    }
}
