use log::{debug, warn};

use super::parameter::{ParameterHandle, ParameterTable, ShaderParameter};
use super::reflect::ProgramInterface;
use crate::error::Result;
use crate::gpu::{CommandList, GpuCommand, ProgramId, ProgramSource, RenderBackend};

/// A linked vertex + fragment program and its resolved parameter handles
///
/// Handles are valid from a successful [`build`](Self::build) until
/// [`release`](Self::release).
#[derive(Debug)]
pub struct ShaderProgram {
    program: Option<ProgramId>,
    parameters: ParameterTable,
    interface: ProgramInterface,
}

impl ShaderProgram {
    /// Compile and link both stages, resolve every declared parameter, then create
    /// the backend program
    ///
    /// Nothing is allocated on the backend when compilation or resolution fails.
    pub fn build<B: RenderBackend + ?Sized>(
        backend: &mut B,
        vertex: &str,
        fragment: &str,
        declared: &[ShaderParameter],
    ) -> Result<Self> {
        let interface = ProgramInterface::link(vertex, fragment)?;

        let mut parameters = ParameterTable::new();
        for param in declared {
            let handle = interface.resolve(*param)?;
            parameters.insert(*param, handle);
        }

        let program = backend.create_program(&ProgramSource { vertex, fragment }, &interface)?;
        debug!("built program {program:?} with {} parameters", declared.len());

        Ok(Self {
            program: Some(program),
            parameters,
            interface,
        })
    }

    /// Make this the current program for the following commands
    pub fn activate(&self, commands: &mut CommandList) {
        if let Some(program) = self.program {
            commands.push(GpuCommand::UseProgram(program));
        }
    }

    pub fn parameter_handle(&self, param: ShaderParameter) -> Result<ParameterHandle> {
        self.parameters.get(param)
    }

    pub fn parameter_handle_by_name(&self, name: &str) -> Result<ParameterHandle> {
        self.parameters.get_by_name(name)
    }

    /// Backend program, `None` once released
    pub fn program(&self) -> Option<ProgramId> {
        self.program
    }

    pub fn interface(&self) -> &ProgramInterface {
        &self.interface
    }

    /// Free the backend program; later calls do nothing
    pub fn release<B: RenderBackend + ?Sized>(&mut self, backend: &mut B) {
        if let Some(program) = self.program.take() {
            backend.delete_program(program);
            debug!("released program {program:?}");
        }
    }
}

impl Drop for ShaderProgram {
    fn drop(&mut self) {
        if let Some(program) = self.program {
            warn!("shader program {program:?} dropped without release");
        }
    }
}
