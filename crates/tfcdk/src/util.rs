use crate::tokens::{Operand, Token, TokenMap};
use crate::value::Value;
use crate::visit::{self, VisitStringsMut};

/// Replaces markers inside strings with whatever the resolver returns
#[derive(derive_new::new)]
pub(crate) struct MarkerRewriter<'t, R> {
    tokens: &'t TokenMap,
    resolver: R,
}

impl<'t, R> visit::VisitMut<Value> for MarkerRewriter<'t, R>
where
    R: FnMut(&Token) -> String,
{
    fn visit_mut(&mut self, value: &mut Value) {
        let Value::String(s) = value else {
            return;
        };

        if let Some(resolved) = self.tokens.resolve_str(s, &mut self.resolver) {
            *s = resolved;
        }
    }
}

/// Resolves markers into terraform expressions
///
/// A string that is nothing but a lazy marker is replaced by the produced value, so a lazily computed list stays a
/// list in the output.
#[derive(derive_new::new)]
pub(crate) struct TokenResolver<'t> {
    tokens: &'t TokenMap,
}

impl<'t> visit::VisitMut<Value> for TokenResolver<'t> {
    #[tracing::instrument(level = "trace", skip_all)]
    fn visit_mut(&mut self, value: &mut Value) {
        let Value::String(s) = value else {
            return;
        };

        if let Some(Token::Lazy(lazy)) = self.tokens.token_in(s) {
            match lazy.produce() {
                Operand::Value(Value::String(produced)) => {
                    *value = Value::String(produced);
                    self.visit_mut(value);
                }
                Operand::Value(mut produced) => {
                    produced.visit_strings_mut(self);
                    tracing::trace!(?produced, "lazy value expanded");
                    *value = produced;
                }
                Operand::Token(token) => *value = self.tokens.token_to_string(&token).into(),
            }
            return;
        }

        let tokens = self.tokens;
        if let Some(resolved) = tokens.resolve_str(s, &mut |token| tokens.token_to_string(token)) {
            *s = resolved;
        }
    }
}
