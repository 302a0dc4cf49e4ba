//! Template execution

use rand::rngs::StdRng;

use super::parse::{Command, Node, Operand, Pipeline};
use super::value::Value;
use super::{TemplateData, TemplateError};

pub(crate) struct Exec<'a, D: ?Sized> {
    data: &'a D,
    rng: &'a mut StdRng,
    variables: Vec<(String, Value)>,
}

impl<'a, D: TemplateData + ?Sized> Exec<'a, D> {
    pub(crate) fn new(data: &'a D, rng: &'a mut StdRng) -> Self {
        Self {
            data,
            rng,
            variables: vec![("$".to_string(), data.dot())],
        }
    }

    pub(crate) fn render(mut self, nodes: &[Node]) -> Result<String, TemplateError> {
        let mut out = String::new();

        for node in nodes {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Action(pipeline) => {
                    let value = self.pipeline(pipeline)?;
                    if pipeline.binding.is_none() {
                        out.push_str(&value.to_string());
                    }
                }
            }
        }

        Ok(out)
    }

    fn pipeline(&mut self, pipeline: &Pipeline) -> Result<Value, TemplateError> {
        let mut piped = None;
        for command in &pipeline.commands {
            piped = Some(self.command(command, piped)?);
        }
        let value = piped.ok_or_else(|| TemplateError::Parse("empty pipeline".into()))?;

        if let Some(binding) = &pipeline.binding {
            self.bind(&binding.name, binding.declare, value.clone());
        }

        Ok(value)
    }

    fn command(&mut self, command: &Command, piped: Option<Value>) -> Result<Value, TemplateError> {
        let (first, rest) = command
            .operands
            .split_first()
            .ok_or_else(|| TemplateError::Parse("missing command".into()))?;

        match first {
            Operand::Function(func) => {
                let mut args = Vec::with_capacity(rest.len() + 1);
                for operand in rest {
                    args.push(self.operand(operand)?);
                }
                args.extend(piped);
                func.call(args, self.data.request_number(), self.rng)
            }
            other => {
                if !rest.is_empty() || piped.is_some() {
                    return Err(TemplateError::NotAFunction(describe(other)));
                }
                self.operand(other)
            }
        }
    }

    fn operand(&mut self, operand: &Operand) -> Result<Value, TemplateError> {
        match operand {
            Operand::Literal(value) => Ok(value.clone()),
            Operand::Dot => Ok(self.data.dot()),
            Operand::Field(path) => match path.as_slice() {
                [name] => self
                    .data
                    .field(name)
                    .ok_or_else(|| TemplateError::UnknownField(name.clone())),
                _ => Err(TemplateError::UnknownField(path.join("."))),
            },
            Operand::Variable(name) => self
                .variables
                .iter()
                .rev()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.clone())
                .ok_or_else(|| TemplateError::UndefinedVariable(name.clone())),
            Operand::Function(func) => func.call(Vec::new(), self.data.request_number(), self.rng),
            Operand::Pipeline(inner) => self.pipeline(inner),
        }
    }

    fn bind(&mut self, name: &str, declare: bool, value: Value) {
        if !declare {
            if let Some(slot) = self.variables.iter_mut().rev().find(|(n, _)| n == name) {
                slot.1 = value;
                return;
            }
        }
        self.variables.push((name.to_string(), value));
    }
}

fn describe(operand: &Operand) -> String {
    match operand {
        Operand::Literal(value) => value.to_string(),
        Operand::Dot => ".".to_string(),
        Operand::Field(path) => format!(".{}", path.join(".")),
        Operand::Variable(name) => name.clone(),
        Operand::Function(func) => func.name().to_string(),
        Operand::Pipeline(_) => "(pipeline)".to_string(),
    }
}
