//! Job compilation and validation

use crate::component::ComponentBuilder;
use crate::graph::PipelineGraph;
use crate::job::{
    ComponentJob, Job, JobColumn, JobColumnOrigin, JobInput, JobOutcome, JobProperty, JobValue, Literal,
    OutputStreamJob, StageRef,
};
use crate::requirement::RequirementGraph;
use pipewright_core::{
    BuilderError, Column, ColumnId, ComponentId, Diagnostic, DiagnosticCode, InputRef, Location, PropertyValue,
    ScopeId, Severity, SourceOrigin, StageKind, ValidationReport,
};
use std::collections::HashMap;

const STAGE_KINDS: [StageKind; 3] = [StageKind::Filter, StageKind::Transformer, StageKind::Analyzer];

impl PipelineGraph {
    /// Compile the root pipeline (and every nested stream) into a job
    ///
    /// Fails with [`BuilderError::NotConfigured`] listing every problem
    /// when any stage is unconfigured or the pipeline is structurally
    /// incomplete.
    pub fn to_job(&self) -> Result<Job, BuilderError> {
        let problems = self.problems()?;
        if !problems.is_empty() {
            tracing::debug!(problems = problems.len(), "pipeline is not configured");
            return Err(BuilderError::NotConfigured { problems });
        }

        let job = self.compile_scope(self.root)?;
        tracing::debug!(stages = job.stage_count(), "compiled job");
        Ok(job)
    }

    /// Check the whole pipeline without compiling it
    ///
    /// The report carries the job fingerprint when no errors were found.
    pub fn validate(&self) -> ValidationReport {
        let diagnostics = match self.problems() {
            Ok(problems) => problems,
            Err(err) => err.into_diagnostics(),
        };
        let mut report = ValidationReport::from_diagnostics(diagnostics)
            .with_counts(self.components.len(), self.scopes.len());

        if !report.has_errors() {
            match self.compile_scope(self.root).map(|job| job.fingerprint()) {
                Ok(Ok(fingerprint)) => report = report.with_fingerprint(fingerprint),
                Ok(Err(err)) => report.add_diagnostic(Diagnostic::error(DiagnosticCode::NotConfigured, err.to_string())),
                Err(err) => {
                    for diagnostic in err.into_diagnostics() {
                        report.add_diagnostic(diagnostic);
                    }
                }
            }
        }

        report
    }

    fn problems(&self) -> Result<Vec<Diagnostic>, BuilderError> {
        let mut problems = Vec::new();
        let root = self.scope(self.root)?;
        let location = Location::new(self.scope_path(self.root));
        let validation = &self.config.validation;

        if validation.require_source_columns && root.source_columns().is_empty() {
            problems.push(
                Diagnostic::error(DiagnosticCode::NoSourceColumns, "The pipeline reads no source columns")
                    .with_location(location.clone()),
            );
        }
        if validation.require_analyzers && self.analyzers(self.root)?.is_empty() {
            problems.push(
                Diagnostic::error(DiagnosticCode::NoAnalyzers, "The pipeline contains no analyzers")
                    .with_location(location),
            );
        }

        self.collect_unconfigured(self.root, &mut problems);
        Ok(problems)
    }

    fn collect_unconfigured(&self, scope: ScopeId, problems: &mut Vec<Diagnostic>) {
        let Some(builder) = self.scopes.get(&scope) else {
            return;
        };
        let path = self.scope_path(scope);

        for component in builder.components().iter().filter_map(|id| self.components.get(id)) {
            let label = component.label();
            for slot in component.unconfigured_properties() {
                let location = Location::new(path.clone())
                    .with_stage(label.clone())
                    .with_property(slot.name.clone());
                problems.push(
                    Diagnostic::new(
                        DiagnosticCode::UnconfiguredProperty,
                        Severity::Error,
                        format!("Property '{}' of '{}' is required but not set", slot.name, label),
                    )
                    .with_location(location),
                );
            }

            for (_, child) in component.output_streams() {
                self.collect_unconfigured(*child, problems);
            }
        }
    }

    fn compile_scope(&self, scope: ScopeId) -> Result<Job, BuilderError> {
        let builder = self.scope(scope)?;
        let requirements = RequirementGraph::new(self, scope)?;

        let mut stages: HashMap<ComponentId, StageRef> = HashMap::new();
        let mut by_kind: [Vec<&ComponentBuilder>; 3] = [Vec::new(), Vec::new(), Vec::new()];
        for component in builder.components().iter().filter_map(|id| self.components.get(id)) {
            let slot = STAGE_KINDS.iter().position(|k| *k == component.kind()).unwrap_or(0);
            stages.insert(
                component.id(),
                StageRef {
                    kind: component.kind(),
                    index: by_kind[slot].len(),
                },
            );
            by_kind[slot].push(component);
        }

        // Column indexes: sources, then outputs by stage position
        let mut indexes: HashMap<ColumnId, usize> = HashMap::new();
        let mut columns = Vec::new();
        for id in builder.source_columns() {
            let column = self.column(*id).ok_or_else(|| BuilderError::UnknownColumn(id.to_string()))?;
            let source = column
                .as_source()
                .ok_or_else(|| BuilderError::UnknownColumn(column.name().to_string()))?;
            let logical_type = source.metadata().logical_type.clone();
            let origin = match source.origin() {
                SourceOrigin::Table { table } => JobColumnOrigin::Table {
                    table: table.clone(),
                    logical_type,
                },
                SourceOrigin::Stream { .. } => JobColumnOrigin::Stream { logical_type },
            };
            indexes.insert(*id, columns.len());
            columns.push(self.job_column(columns.len(), column, origin));
        }
        let source_columns: Vec<usize> = (0..columns.len()).collect();

        for component in by_kind.iter().flatten() {
            let producer = stages
                .get(&component.id())
                .copied()
                .ok_or(BuilderError::UnknownComponent(component.id()))?;
            for id in component.output_columns() {
                let column = self.column(*id).ok_or_else(|| BuilderError::UnknownColumn(id.to_string()))?;
                indexes.insert(*id, columns.len());
                columns.push(self.job_column(columns.len(), column, JobColumnOrigin::Produced { producer }));
            }
        }

        let mut compiled: [Vec<ComponentJob>; 3] = [Vec::new(), Vec::new(), Vec::new()];
        for (slot, components) in by_kind.iter().enumerate() {
            for component in components {
                let job = self.compile_component(component, &stages, &indexes, &requirements)?;
                compiled[slot].push(job);
            }
        }
        let [filters, transformers, analyzers] = compiled;

        Ok(Job {
            columns,
            source_columns,
            filters,
            transformers,
            analyzers,
        })
    }

    fn job_column(&self, index: usize, column: &Column, origin: JobColumnOrigin) -> JobColumn {
        JobColumn {
            index,
            name: column.name().to_string(),
            family: column.family(),
            origin,
        }
    }

    fn compile_component(
        &self,
        component: &ComponentBuilder,
        stages: &HashMap<ComponentId, StageRef>,
        indexes: &HashMap<ColumnId, usize>,
        requirements: &RequirementGraph<'_>,
    ) -> Result<ComponentJob, BuilderError> {
        let input = |input: &InputRef| -> Result<JobInput, BuilderError> {
            match input {
                InputRef::Column { id } => indexes
                    .get(id)
                    .map(|index| JobInput::Column { index: *index })
                    .ok_or_else(|| BuilderError::ColumnNotAvailable {
                        stage: component.label(),
                        column: self.column_label(*id),
                    }),
                InputRef::Constant(c) => Ok(JobInput::Constant(c.clone())),
                InputRef::Expression(e) => Ok(JobInput::Expression(e.clone())),
            }
        };

        let mut properties = Vec::new();
        for slot in component.descriptor().slots() {
            let value = match component.property(&slot.name) {
                Some(PropertyValue::Columns(inputs)) => {
                    JobValue::Columns(inputs.iter().map(&input).collect::<Result<_, _>>()?)
                }
                Some(PropertyValue::Value(value)) => JobValue::Literal(Literal(value.clone())),
                None => continue,
            };
            properties.push(JobProperty {
                name: slot.name.clone(),
                value,
            });
        }

        let requirement = match requirements.effective(component.id()) {
            Some(requirement) => requirement
                .outcomes()
                .into_iter()
                .map(|outcome| {
                    stages
                        .get(&outcome.filter)
                        .map(|stage| JobOutcome {
                            filter: stage.index,
                            category: outcome.category.clone(),
                        })
                        .ok_or_else(|| BuilderError::InvalidRequirement {
                            stage: component.label(),
                            reason: format!("{} is not part of the pipeline", outcome.filter),
                        })
                })
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };

        let mut output_streams = Vec::new();
        for (name, scope) in component.output_streams() {
            let child = self.scope(*scope)?;
            if child.components().is_empty() {
                continue;
            }
            output_streams.push(OutputStreamJob {
                name: name.clone(),
                job: self.compile_scope(*scope)?,
            });
        }

        Ok(ComponentJob {
            stage: stages
                .get(&component.id())
                .copied()
                .ok_or(BuilderError::UnknownComponent(component.id()))?,
            descriptor: component.descriptor().name().to_string(),
            name: component.name().map(str::to_string),
            properties,
            inputs: component
                .input_columns()
                .iter()
                .map(&input)
                .collect::<Result<_, _>>()?,
            outputs: component
                .output_columns()
                .iter()
                .filter_map(|id| indexes.get(id).copied())
                .collect(),
            requirement,
            output_streams,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::customers_graph;
    use pipewright_catalog::builtin;
    use pipewright_core::{BuilderError, DiagnosticCode};
    use serde_json::json;

    #[test]
    fn empty_pipeline_reports_structural_problems() {
        let graph = customers_graph();
        let report = graph.validate();
        let codes: Vec<DiagnosticCode> = report.diagnostics.iter().map(|d| d.code).collect();
        assert_eq!(codes, vec![DiagnosticCode::NoSourceColumns, DiagnosticCode::NoAnalyzers]);
        assert!(report.fingerprint.is_none());

        let err = graph.to_job().unwrap_err();
        assert!(matches!(err, BuilderError::NotConfigured { problems } if problems.len() == 2));
    }

    #[test]
    fn every_unconfigured_slot_is_listed() {
        let mut graph = customers_graph();
        let root = graph.root();
        graph.add_source_column(root, "shop.customers.age").unwrap();
        graph.add_filter(root, builtin::number_range()).unwrap();
        graph.add_analyzer(root, builtin::record_counter()).unwrap();

        let Err(BuilderError::NotConfigured { problems }) = graph.to_job() else {
            panic!("expected NotConfigured");
        };
        let slots: Vec<_> = problems
            .iter()
            .filter_map(|p| p.location.as_ref().and_then(|l| l.property.clone()))
            .collect();
        assert_eq!(slots, vec!["column", "lowest value", "highest value"]);
    }

    #[test]
    fn compiled_job_mirrors_the_graph() {
        let mut graph = customers_graph();
        let root = graph.root();
        let email = graph.add_source_column(root, "shop.customers.email").unwrap();
        let length = graph.add_transformer(root, builtin::string_length()).unwrap();
        graph.bind(length, "columns", vec![email.into()]).unwrap();
        let length_out = graph.component(length).unwrap().output_columns()[0];

        let distribution = graph.add_analyzer(root, builtin::value_distribution()).unwrap();
        graph.bind(distribution, "columns", vec![length_out.into()]).unwrap();
        graph.set_configured_property(distribution, "top n", json!(5)).unwrap();

        let job = graph.to_job().unwrap();
        assert_eq!(job.columns().len(), 2);
        assert_eq!(job.transformers()[0].outputs(), &[1]);
        assert_eq!(job.analyzers()[0].inputs(), &[crate::job::JobInput::Column { index: 1 }]);
        assert!(job.analyzers()[0].property("top n").is_some());

        let report = graph.validate();
        assert!(!report.has_errors());
        assert_eq!(report.fingerprint, Some(job.fingerprint().unwrap()));
    }
}
