//! Static mode -> handler table
//!
//! Built once at startup with one handler per mode. Handlers only ever run
//! on the main context, which passes them its own state.

use std::collections::HashMap;

use crate::rewrite::RewriteMode;

pub type Handler<S> = Box<dyn FnMut(&mut S)>;

#[derive(Debug, thiserror::Error)]
#[error("no handler registered for {0}")]
pub struct MissingHandler(pub RewriteMode);

pub struct HandlerTable<S> {
    handlers: HashMap<RewriteMode, Handler<S>>,
}

impl<S> HandlerTable<S> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// The same handler for every mode, parameterised by the mode
    pub fn for_all_modes<F>(handler: F) -> Self
    where
        S: 'static,
        F: Fn(&mut S, RewriteMode) + Clone + 'static,
    {
        let mut table = Self::new();
        for mode in RewriteMode::ALL {
            let handler = handler.clone();
            table.register(mode, Box::new(move |state: &mut S| handler(state, mode)));
        }
        table
    }

    /// Set the handler for `mode`, replacing any earlier one
    pub fn register(&mut self, mode: RewriteMode, handler: Handler<S>) {
        self.handlers.insert(mode, handler);
    }

    /// Fails on the first mode without a handler
    pub fn ensure_complete(&self) -> Result<(), MissingHandler> {
        match RewriteMode::ALL.iter().find(|m| !self.handlers.contains_key(*m)) {
            Some(&mode) => Err(MissingHandler(mode)),
            None => Ok(()),
        }
    }

    /// Run the handler for `mode`. Returns false if none is registered.
    pub fn invoke(&mut self, mode: RewriteMode, state: &mut S) -> bool {
        match self.handlers.get_mut(&mode) {
            Some(handler) => {
                handler(state);
                true
            }
            None => false,
        }
    }
}

impl<S> Default for HandlerTable<S> {
    fn default() -> Self {
        Self::new()
    }
}
