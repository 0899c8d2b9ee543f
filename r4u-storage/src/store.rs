// Copyright 2025 R4U Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use crate::collection::Collection;
use crate::snapshot::{read_snapshot, write_snapshot};
use parking_lot::Mutex;
use r4u_core::{
    CoreError, CoreResult, Evaluation, EvaluationConfig, ExecutionResult, Grade, Grader,
    HttpTrace, Implementation, Project, Task, TargetTaskMetrics, TestCase, Trace,
};
use std::path::PathBuf;
use tracing::{info, warn};

/// The single store instance a server process opens. Holds one
/// [`Collection`] per entity plus a coarse transaction lock used by
/// multi-step writers (auto-create, evaluation commit points) that must
/// appear atomic to concurrent readers — the store has no real MVCC, so
/// "transaction" here means "hold this lock across the writes".
pub struct Storage {
    data_dir: Option<PathBuf>,
    pub tx_lock: Mutex<()>,

    pub projects: Collection<Project>,
    pub http_traces: Collection<HttpTrace>,
    pub traces: Collection<Trace>,
    pub tasks: Collection<Task>,
    pub implementations: Collection<Implementation>,
    pub test_cases: Collection<TestCase>,
    pub graders: Collection<Grader>,
    pub grades: Collection<Grade>,
    pub execution_results: Collection<ExecutionResult>,
    pub evaluation_configs: Collection<EvaluationConfig>,
    pub evaluations: Collection<Evaluation>,
    pub target_metrics: Collection<TargetTaskMetrics>,
}

impl Storage {
    pub fn in_memory() -> Self {
        Self {
            data_dir: None,
            tx_lock: Mutex::new(()),
            projects: Collection::new(),
            http_traces: Collection::new(),
            traces: Collection::new(),
            tasks: Collection::new(),
            implementations: Collection::new(),
            test_cases: Collection::new(),
            graders: Collection::new(),
            grades: Collection::new(),
            execution_results: Collection::new(),
            evaluation_configs: Collection::new(),
            evaluations: Collection::new(),
            target_metrics: Collection::new(),
        }
    }

    /// Open (and, if present, restore from) a snapshot directory.
    pub fn open(data_dir: PathBuf) -> std::io::Result<Self> {
        let store = Self {
            data_dir: Some(data_dir.clone()),
            ..Self::in_memory()
        };
        store.projects.restore(read_snapshot(&data_dir, "projects")?);
        store
            .http_traces
            .restore(read_snapshot(&data_dir, "http_traces")?);
        store.traces.restore(read_snapshot(&data_dir, "traces")?);
        store.tasks.restore(read_snapshot(&data_dir, "tasks")?);
        store
            .implementations
            .restore(read_snapshot(&data_dir, "implementations")?);
        store
            .test_cases
            .restore(read_snapshot(&data_dir, "test_cases")?);
        store.graders.restore(read_snapshot(&data_dir, "graders")?);
        store.grades.restore(read_snapshot(&data_dir, "grades")?);
        store
            .execution_results
            .restore(read_snapshot(&data_dir, "execution_results")?);
        store
            .evaluation_configs
            .restore(read_snapshot(&data_dir, "evaluation_configs")?);
        store
            .evaluations
            .restore(read_snapshot(&data_dir, "evaluations")?);
        store
            .target_metrics
            .restore(read_snapshot(&data_dir, "target_metrics")?);
        info!(dir = %data_dir.display(), "restored storage snapshot");
        Ok(store)
    }

    /// Persist every collection to `data_dir`, if one was configured.
    pub fn flush(&self) -> std::io::Result<()> {
        let Some(dir) = &self.data_dir else {
            return Ok(());
        };
        write_snapshot(dir, "projects", &self.projects.snapshot())?;
        write_snapshot(dir, "http_traces", &self.http_traces.snapshot())?;
        write_snapshot(dir, "traces", &self.traces.snapshot())?;
        write_snapshot(dir, "tasks", &self.tasks.snapshot())?;
        write_snapshot(dir, "implementations", &self.implementations.snapshot())?;
        write_snapshot(dir, "test_cases", &self.test_cases.snapshot())?;
        write_snapshot(dir, "graders", &self.graders.snapshot())?;
        write_snapshot(dir, "grades", &self.grades.snapshot())?;
        write_snapshot(
            dir,
            "execution_results",
            &self.execution_results.snapshot(),
        )?;
        write_snapshot(
            dir,
            "evaluation_configs",
            &self.evaluation_configs.snapshot(),
        )?;
        write_snapshot(dir, "evaluations", &self.evaluations.snapshot())?;
        write_snapshot(dir, "target_metrics", &self.target_metrics.snapshot())?;
        Ok(())
    }

    /// Get-or-create a project by name (first reference creates it, per
    /// spec §3 "Project" lifecycle).
    pub fn ensure_project(&self, name: &str) -> Project {
        if let Some(existing) = self
            .projects
            .iter()
            .into_iter()
            .find(|p| p.name == name)
        {
            return existing;
        }
        let id = self.projects.next_id();
        let project = Project {
            id,
            name: name.to_string(),
        };
        self.projects.insert(id, project.clone());
        project
    }

    /// Insert a Grade, enforcing the XOR invariant (spec §8 "Grade XOR").
    pub fn insert_grade(&self, grade: Grade) -> CoreResult<Grade> {
        if !grade.target_is_valid() {
            return Err(CoreError::Validation(
                "grade must reference exactly one of trace_id or execution_result_id".into(),
            ));
        }
        let id = self.grades.next_id();
        let mut grade = grade;
        grade.id = id;
        self.grades.insert(id, grade.clone());
        Ok(grade)
    }

    /// Cascade-delete a Task: its Implementations, TestCases,
    /// EvaluationConfig and Evaluations (spec §3 ownership rules).
    pub fn delete_task_cascade(&self, task_id: u64) {
        let impl_ids: Vec<u64> = self
            .implementations
            .iter()
            .into_iter()
            .filter(|i| i.task_id == task_id)
            .map(|i| i.id)
            .collect();
        for id in &impl_ids {
            self.implementations.remove(*id);
        }
        let test_case_ids: Vec<u64> = self
            .test_cases
            .iter()
            .into_iter()
            .filter(|t| t.task_id == task_id)
            .map(|t| t.id)
            .collect();
        for id in test_case_ids {
            self.test_cases.remove(id);
        }
        let eval_ids: Vec<u64> = self
            .evaluations
            .iter()
            .into_iter()
            .filter(|e| e.task_id == task_id)
            .map(|e| e.id)
            .collect();
        for id in eval_ids {
            self.evaluations.remove(id);
        }
        self.evaluation_configs.remove(task_id);
        self.tasks.remove(task_id);
        warn!(task_id, "cascade-deleted task and its children");
    }

    /// Cascade-delete a Grader: its Grades (spec §3 "Cascaded on grader
    /// delete").
    pub fn delete_grader_cascade(&self, grader_id: u64) {
        let grade_ids: Vec<u64> = self
            .grades
            .iter()
            .into_iter()
            .filter(|g| g.grader_id == grader_id)
            .map(|g| g.id)
            .collect();
        for id in grade_ids {
            self.grades.remove(id);
        }
        self.graders.remove(grader_id);
    }

    pub fn implementations_for_task(&self, task_id: u64) -> Vec<Implementation> {
        self.implementations
            .iter()
            .into_iter()
            .filter(|i| i.task_id == task_id)
            .collect()
    }

    pub fn test_cases_for_task(&self, task_id: u64) -> Vec<TestCase> {
        self.test_cases
            .iter()
            .into_iter()
            .filter(|t| t.task_id == task_id)
            .collect()
    }

    pub fn execution_results_for_task(&self, task_id: u64) -> Vec<ExecutionResult> {
        self.execution_results
            .iter()
            .into_iter()
            .filter(|r| r.task_id == task_id)
            .collect()
    }

    pub fn task_by_project_and_path(&self, project_id: u64, path: Option<&str>) -> Option<Task> {
        self.tasks.iter().into_iter().find(|t| {
            t.project_id == project_id && t.path.as_deref() == path
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_project_is_idempotent_by_name() {
        let store = Storage::in_memory();
        let a = store.ensure_project("acme");
        let b = store.ensure_project("acme");
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn grade_insert_rejects_both_targets_set() {
        let store = Storage::in_memory();
        let grade = Grade {
            id: 0,
            grader_id: 1,
            trace_id: Some(1),
            execution_result_id: Some(2),
            score_float: Some(0.5),
            score_boolean: None,
            reasoning: None,
            confidence: None,
            prompt_tokens: None,
            completion_tokens: None,
            total_tokens: None,
            grading_started_at: 0,
            grading_completed_at: 0,
            error: None,
        };
        assert!(store.insert_grade(grade).is_err());
    }

    #[test]
    fn deleting_task_cascades_implementations() {
        let store = Storage::in_memory();
        let task_id = store.tasks.next_id();
        store.tasks.insert(
            task_id,
            Task {
                id: task_id,
                project_id: 1,
                name: "t".into(),
                description: String::new(),
                path: None,
                production_version_id: None,
                response_schema: None,
            },
        );
        let impl_id = store.implementations.next_id();
        store.implementations.insert(
            impl_id,
            Implementation {
                id: impl_id,
                task_id,
                version: "0.1".into(),
                prompt: "hi".into(),
                model: "gpt-4".into(),
                temperature: None,
                reasoning: None,
                tools: None,
                tool_choice: None,
                max_output_tokens: 256,
                response_schema: None,
                temp: false,
            },
        );
        store.delete_task_cascade(task_id);
        assert!(store.tasks.get(task_id).is_none());
        assert!(store.implementations.get(impl_id).is_none());
    }
}
