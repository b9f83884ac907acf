//! Named task lookup used by worker processes

use forkline_core::{Task, TaskNames};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;

use crate::error::ExecutionError;

/// Mapping from task name to task, as exposed by a worker process
#[derive(Clone, Default)]
pub struct TaskRegister {
    tasks: HashMap<String, Task>,
}

impl TaskRegister {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a register from a table of exported values, keeping only the
    /// entries that are tasks
    pub fn from_map<K, I>(exports: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Box<dyn Any + Send + Sync>)>,
    {
        exports
            .into_iter()
            .filter_map(|(name, value)| {
                value
                    .downcast::<Task>()
                    .ok()
                    .map(|task| (name.into(), *task))
            })
            .collect()
    }

    /// Register a task under `name`, returning any task it replaces.
    ///
    /// Unnamed tasks take the register name as their display name.
    pub fn register(&mut self, name: impl Into<String>, task: Task) -> Option<Task> {
        let name = name.into();
        let task = match task.name() {
            Some(_) => task,
            None => task.with_name(name.clone()),
        };
        self.tasks.insert(name, task)
    }

    /// Builder form of [`register`](Self::register)
    pub fn with_task(mut self, name: impl Into<String>, task: Task) -> Self {
        self.register(name, task);
        self
    }

    pub fn unregister(&mut self, name: &str) -> Option<Task> {
        self.tasks.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&Task> {
        self.tasks.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tasks.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Resolve every name, in order, or fail on the first unknown one.
    ///
    /// Nothing is returned unless all names resolve.
    pub fn resolve(&self, names: &TaskNames) -> Result<Vec<Task>, ExecutionError> {
        names
            .iter()
            .map(|name| {
                self.get(name)
                    .cloned()
                    .ok_or_else(|| ExecutionError::Lookup(name.to_string()))
            })
            .collect()
    }
}

impl<K: Into<String>> FromIterator<(K, Task)> for TaskRegister {
    fn from_iter<I: IntoIterator<Item = (K, Task)>>(iter: I) -> Self {
        let mut register = TaskRegister::new();
        for (name, task) in iter {
            register.register(name, task);
        }
        register
    }
}

impl fmt::Debug for TaskRegister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRegister")
            .field("tasks", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> Task {
        Task::from_fn(|| Ok(()))
    }

    #[test]
    fn test_register_names_unnamed_tasks() {
        let mut register = TaskRegister::new();
        assert!(register.register("build", noop()).is_none());
        register.register("test", Task::from_fn_named("cargo test", || Ok(())));

        assert_eq!(register.get("build").unwrap().name(), Some("build"));
        assert_eq!(register.get("test").unwrap().name(), Some("cargo test"));
        assert_eq!(register.names(), vec!["build", "test"]);

        assert!(register.register("build", noop()).is_some());
        assert_eq!(register.len(), 2);
        assert!(register.unregister("build").is_some());
        assert!(!register.contains("build"));
    }

    #[test]
    fn test_resolve_is_all_or_nothing() {
        let register: TaskRegister = vec![("build", noop()), ("test", noop())]
            .into_iter()
            .collect();

        let tasks = register.resolve(&TaskNames::from(["test", "build"])).unwrap();
        let names: Vec<_> = tasks.iter().map(|task| task.display_name()).collect();
        assert_eq!(names, vec!["test", "build"]);

        let missing = register.resolve(&TaskNames::from(["build", "deploy", "lint"]));
        match missing {
            Err(ExecutionError::Lookup(name)) => assert_eq!(name, "deploy"),
            other => panic!("expected lookup failure, got {:?}", other),
        }
    }

    #[test]
    fn test_from_map_keeps_only_tasks() {
        let exports: Vec<(&str, Box<dyn Any + Send + Sync>)> = vec![
            ("build", Box::new(noop())),
            ("version", Box::new("1.0.0")),
            ("retries", Box::new(3_u32)),
        ];

        let register = TaskRegister::from_map(exports);
        assert_eq!(register.names(), vec!["build"]);
        assert!(!register.is_empty());
    }
}
