// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 The Parley Authors

//! Interactive sub-prompts issued by a running workflow

pub mod machine;
pub mod prompt;

pub use machine::{
    AnsweredPrompt, Correlation, InteractiveAnswer, InteractiveMachine, PromptState,
    ResumeRequest,
};
pub use prompt::{
    FieldChoice, FormField, InteractivePrompt, PromptKind, ResumeContext, SelectOption,
    WorkflowState, DEFAULT_FORM_DESCRIPTION, DEFAULT_SELECT_DESCRIPTION,
};
