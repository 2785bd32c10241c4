//! Task registry: the explicit `(model_type, TaskKind) -> constructor` table
//! and the loader built on top of it.

use crate::api::{TaskDescriptor, TaskKind};
use crate::backend::{BackendLoader, default_loader};
use crate::error::{Result, TaskError};
use crate::model_dir::ModelDirectory;
use crate::tasks::{
    BertQuestionAnswering, BertTextClassification, BertTextEncoding, BertTokenClassification,
    BertZeroShotClassification, SentencePieceTextGeneration,
};
use crate::traits::{
    QuestionAnswering, TextClassification, TextEncoding, TextGeneration, TokenClassification,
    ZeroShotClassification,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// Builds a loaded task from an opened model directory.
pub type TaskConstructor = fn(&ModelDirectory, &dyn BackendLoader) -> Result<LoadedTask>;

/// A loaded task, tagged by capability.
///
/// Immutable after construction and cheap to clone; every clone shares the
/// same tokenizer and backend.
#[derive(Clone)]
pub enum LoadedTask {
    TextEncoding(Arc<dyn TextEncoding>),
    TokenClassification(Arc<dyn TokenClassification>),
    TextClassification(Arc<dyn TextClassification>),
    QuestionAnswering(Arc<dyn QuestionAnswering>),
    ZeroShotClassification(Arc<dyn ZeroShotClassification>),
    TextGeneration(Arc<dyn TextGeneration>),
}

impl LoadedTask {
    pub fn kind(&self) -> TaskKind {
        match self {
            Self::TextEncoding(_) => TaskKind::TextEncoding,
            Self::TokenClassification(_) => TaskKind::TokenClassification,
            Self::TextClassification(_) => TaskKind::TextClassification,
            Self::QuestionAnswering(_) => TaskKind::QuestionAnswering,
            Self::ZeroShotClassification(_) => TaskKind::ZeroShotClassification,
            Self::TextGeneration(_) => TaskKind::TextGeneration,
        }
    }
}

impl std::fmt::Debug for LoadedTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("LoadedTask").field(&self.kind()).finish()
    }
}

/// A task capability trait that can be extracted from a [`LoadedTask`].
///
/// Implemented for each `dyn` capability trait so that
/// [`TaskRegistry::load`] can be called as `registry.load::<dyn TextEncoding>(..)`.
pub trait Capability: Send + Sync + 'static {
    const KIND: TaskKind;

    fn from_loaded(task: LoadedTask) -> Option<Arc<Self>>;
}

macro_rules! capability {
    ($trait:ident) => {
        impl Capability for dyn $trait {
            const KIND: TaskKind = TaskKind::$trait;

            fn from_loaded(task: LoadedTask) -> Option<Arc<Self>> {
                match task {
                    LoadedTask::$trait(inner) => Some(inner),
                    _ => None,
                }
            }
        }
    };
}

capability!(TextEncoding);
capability!(TokenClassification);
capability!(TextClassification);
capability!(QuestionAnswering);
capability!(ZeroShotClassification);
capability!(TextGeneration);

fn text_encoding(dir: &ModelDirectory, loader: &dyn BackendLoader) -> Result<LoadedTask> {
    Ok(LoadedTask::TextEncoding(Arc::new(BertTextEncoding::load(
        dir, loader,
    )?)))
}

fn token_classification(dir: &ModelDirectory, loader: &dyn BackendLoader) -> Result<LoadedTask> {
    Ok(LoadedTask::TokenClassification(Arc::new(
        BertTokenClassification::load(dir, loader)?,
    )))
}

fn text_classification(dir: &ModelDirectory, loader: &dyn BackendLoader) -> Result<LoadedTask> {
    Ok(LoadedTask::TextClassification(Arc::new(
        BertTextClassification::load(dir, loader)?,
    )))
}

fn question_answering(dir: &ModelDirectory, loader: &dyn BackendLoader) -> Result<LoadedTask> {
    Ok(LoadedTask::QuestionAnswering(Arc::new(
        BertQuestionAnswering::load(dir, loader)?,
    )))
}

fn zero_shot(dir: &ModelDirectory, loader: &dyn BackendLoader) -> Result<LoadedTask> {
    Ok(LoadedTask::ZeroShotClassification(Arc::new(
        BertZeroShotClassification::load(dir, loader)?,
    )))
}

fn text_generation(dir: &ModelDirectory, loader: &dyn BackendLoader) -> Result<LoadedTask> {
    Ok(LoadedTask::TextGeneration(Arc::new(
        SentencePieceTextGeneration::load(dir, loader)?,
    )))
}

/// Resolves task descriptors to loaded tasks.
///
/// Obtain one through [`TaskRegistry::builder()`]:
///
/// ```rust,no_run
/// # use uni_tasks::api::{TaskDescriptor, TaskKind};
/// # use uni_tasks::registry::TaskRegistry;
/// # use uni_tasks::traits::QuestionAnswering;
/// # fn example() -> uni_tasks::error::Result<()> {
/// let registry = TaskRegistry::builder().with_defaults().build();
/// let descriptor = TaskDescriptor::new(TaskKind::QuestionAnswering, "models/squad");
/// let qa = registry.load::<dyn QuestionAnswering>(&descriptor)?;
/// # Ok(())
/// # }
/// ```
pub struct TaskRegistry {
    constructors: HashMap<(String, TaskKind), TaskConstructor>,
    backend: Arc<dyn BackendLoader>,
}

impl TaskRegistry {
    pub fn builder() -> TaskRegistryBuilder {
        TaskRegistryBuilder::default()
    }

    /// Whether a constructor exists for `model_type` and `kind`.
    pub fn supports(&self, model_type: &str, kind: TaskKind) -> bool {
        self.constructors
            .contains_key(&(model_type.to_string(), kind))
    }

    /// Every registered model type, sorted.
    pub fn model_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.constructors.keys().map(|(t, _)| t.as_str()).collect();
        types.sort_unstable();
        types.dedup();
        types
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Load the task described by `descriptor` for the capability `C`.
    ///
    /// Fails with [`TaskError::CapabilityMismatch`] when the descriptor asks
    /// for a different task kind than `C`.
    pub fn load<C: Capability + ?Sized>(&self, descriptor: &TaskDescriptor) -> Result<Arc<C>> {
        if descriptor.kind != C::KIND {
            return Err(TaskError::CapabilityMismatch(format!(
                "Descriptor for '{}' requests {} but {} was asked for",
                descriptor.model_name,
                descriptor.kind,
                C::KIND
            )));
        }
        let task = self.load_task(descriptor)?;
        let kind = task.kind();
        C::from_loaded(task).ok_or_else(|| {
            TaskError::CapabilityMismatch(format!(
                "Constructor for '{}' produced {} instead of {}",
                descriptor.model_name,
                kind,
                C::KIND
            ))
        })
    }

    /// Open the model directory, resolve its model type, and run the
    /// registered constructor.
    #[tracing::instrument(skip(self, descriptor), fields(task = %descriptor.kind, model = %descriptor.model_name))]
    pub fn load_task(&self, descriptor: &TaskDescriptor) -> Result<LoadedTask> {
        descriptor.validate()?;
        let start = Instant::now();
        let result = self.construct(descriptor);
        metrics::histogram!("task_load.duration_seconds").record(start.elapsed().as_secs_f64());

        match &result {
            Ok(task) => {
                metrics::counter!("task_load.total", "status" => "success").increment(1);
                tracing::info!(
                    task = %task.kind(),
                    model = %descriptor.model_name,
                    backend = self.backend.name(),
                    "Task loaded"
                );
            }
            Err(e) => {
                metrics::counter!("task_load.total", "status" => "failure").increment(1);
                tracing::error!(model = %descriptor.model_name, error = %e, "Task load failed");
            }
        }
        result
    }

    fn construct(&self, descriptor: &TaskDescriptor) -> Result<LoadedTask> {
        let dir = ModelDirectory::open(&descriptor.model_directory)?;
        let model_type = dir.model_type().to_string();

        let Some(constructor) = self
            .constructors
            .get(&(model_type.clone(), descriptor.kind))
        else {
            if self.constructors.keys().any(|(t, _)| *t == model_type) {
                return Err(TaskError::CapabilityMismatch(format!(
                    "Model type '{}' does not support {}",
                    model_type, descriptor.kind
                )));
            }
            return Err(TaskError::Config(format!(
                "Unsupported model type '{}' in '{}'",
                model_type,
                dir.path().display()
            )));
        };

        tracing::debug!(model_type = %model_type, "Resolved task constructor");
        constructor(&dir, self.backend.as_ref())
    }
}

/// Builder for [`TaskRegistry`].
#[derive(Default)]
pub struct TaskRegistryBuilder {
    constructors: HashMap<(String, TaskKind), TaskConstructor>,
    backend: Option<Arc<dyn BackendLoader>>,
}

impl TaskRegistryBuilder {
    /// Register the built-in model types.
    ///
    /// | model_type | tasks |
    /// |---|---|
    /// | `bert`, `electra` | encoding, token and text classification, QA, zero-shot |
    /// | `marian`, `pegasus` | text generation |
    pub fn with_defaults(mut self) -> Self {
        for model_type in ["bert", "electra"] {
            self = self
                .register(model_type, TaskKind::TextEncoding, text_encoding)
                .register(model_type, TaskKind::TokenClassification, token_classification)
                .register(model_type, TaskKind::TextClassification, text_classification)
                .register(model_type, TaskKind::QuestionAnswering, question_answering)
                .register(model_type, TaskKind::ZeroShotClassification, zero_shot);
        }
        for model_type in ["marian", "pegasus"] {
            self = self.register(model_type, TaskKind::TextGeneration, text_generation);
        }
        self
    }

    /// Register (or replace) the constructor for `model_type` and `kind`.
    pub fn register(
        mut self,
        model_type: impl Into<String>,
        kind: TaskKind,
        constructor: TaskConstructor,
    ) -> Self {
        self.constructors
            .insert((model_type.into(), kind), constructor);
        self
    }

    /// Use `backend` for model-forward collaborators instead of the default.
    pub fn backend(mut self, backend: Arc<dyn BackendLoader>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn build(self) -> TaskRegistry {
        TaskRegistry {
            constructors: self.constructors,
            backend: self.backend.unwrap_or_else(default_loader),
        }
    }
}
