use crate::procedure::Procedure;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ProcedureId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct GlobalId(pub usize);

/// A module-global byte array with external linkage, so the run-time can
/// locate the Nisse counter and index arrays by well-known name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalArray {
    pub name: String,
    pub byte_size: usize,
}

/// A translation unit: the procedures the pass walks plus any globals the
/// instrumentation allocated. Zero-initialised global memory comes to life
/// when the interpreter starts a run.
pub struct Module {
    pub(crate) name: String,
    pub(crate) procedures: Vec<Procedure>,
    pub(crate) globals: Vec<GlobalArray>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            procedures: Vec::new(),
            globals: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_procedure(&mut self, proc: Procedure) -> ProcedureId {
        self.procedures.push(proc);
        ProcedureId(self.procedures.len() - 1)
    }

    pub fn procedure(&self, id: ProcedureId) -> &Procedure {
        &self.procedures[id.0]
    }

    pub fn procedure_mut(&mut self, id: ProcedureId) -> &mut Procedure {
        &mut self.procedures[id.0]
    }

    pub fn procedures(&self) -> &[Procedure] {
        &self.procedures
    }

    pub fn num_procedures(&self) -> usize {
        self.procedures.len()
    }

    pub fn procedure_by_name(&self, name: &str) -> Option<ProcedureId> {
        self.procedures
            .iter()
            .position(|proc| proc.name() == name)
            .map(ProcedureId)
    }

    pub fn add_global(&mut self, name: impl Into<String>, byte_size: usize) -> GlobalId {
        self.globals.push(GlobalArray {
            name: name.into(),
            byte_size,
        });
        GlobalId(self.globals.len() - 1)
    }

    pub fn global(&self, id: GlobalId) -> &GlobalArray {
        &self.globals[id.0]
    }

    pub fn globals(&self) -> &[GlobalArray] {
        &self.globals
    }
}
