//! Compile-time checked handler adapters.
//!
//! A callback is accepted for a resolver set when it takes exactly the
//! resolvers' value types, in order, and returns either `Result<R, E>` with a
//! serializable `R` or `()`. Any other pairing fails to compile, so typed
//! handlers never carry a runtime signature error.

use std::marker::PhantomData;

use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use super::{FailHook, Output};
use crate::error::BindError;
use crate::request::Request;
use crate::response::ResponseWriter;
use crate::value::{TypedResolver, ValueResolver};

/// Ordered set of declared values whose resolved types form `Args`.
pub trait ResolverSet: Send + Sync + 'static {
    type Args;

    /// Resolve every value in declaration order, stopping at the first
    /// failure the fail hook does not absorb.
    fn resolve_all(
        &self,
        req: &Request,
        res: &ResponseWriter,
        on_fail: Option<&FailHook>,
    ) -> anyhow::Result<Self::Args>;

    fn resolvers(&self) -> Vec<&dyn ValueResolver>;
}

/// Callback whose parameters are `Args`. `M` marks the return shape.
pub trait Callback<Args, M>: Send + Sync + 'static {
    const OUTPUT: Output;

    /// Invoke with resolved arguments; `Some` carries structured output.
    fn invoke(&self, args: Args) -> anyhow::Result<Option<Value>>;
}

/// Marker for callbacks returning `Result<R, E>`.
pub struct Structured<R, E>(PhantomData<fn() -> (R, E)>);

/// Marker for callbacks returning nothing.
pub struct SideEffect;

pub(crate) fn resolve_one<T: Send + 'static>(
    resolver: &TypedResolver<T>,
    req: &Request,
    res: &ResponseWriter,
    on_fail: Option<&FailHook>,
) -> anyhow::Result<T> {
    match resolver.resolve(req, res) {
        Ok(value) => Ok(value),
        Err(err) => {
            warn!(
                request_id = %req.request_id,
                field = resolver.field(),
                error = %err,
                "resolve value failed"
            );
            match on_fail {
                Some(hook) => {
                    hook(resolver as &dyn ValueResolver, err)?;
                    Ok(resolver.zero_value())
                }
                None => Err(err),
            }
        }
    }
}

impl ResolverSet for () {
    type Args = ();

    fn resolve_all(
        &self,
        _req: &Request,
        _res: &ResponseWriter,
        _on_fail: Option<&FailHook>,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    fn resolvers(&self) -> Vec<&dyn ValueResolver> {
        Vec::new()
    }
}

impl<A: Send + 'static> ResolverSet for TypedResolver<A> {
    type Args = (A,);

    fn resolve_all(
        &self,
        req: &Request,
        res: &ResponseWriter,
        on_fail: Option<&FailHook>,
    ) -> anyhow::Result<(A,)> {
        Ok((resolve_one(self, req, res, on_fail)?,))
    }

    fn resolvers(&self) -> Vec<&dyn ValueResolver> {
        vec![self as &dyn ValueResolver]
    }
}

macro_rules! impl_resolver_set {
    ($($A:ident $r:ident),+) => {
        impl<$($A: Send + 'static),+> ResolverSet for ($(TypedResolver<$A>,)+) {
            type Args = ($($A,)+);

            fn resolve_all(
                &self,
                req: &Request,
                res: &ResponseWriter,
                on_fail: Option<&FailHook>,
            ) -> anyhow::Result<Self::Args> {
                let ($($r,)+) = self;
                Ok(($(resolve_one($r, req, res, on_fail)?,)+))
            }

            fn resolvers(&self) -> Vec<&dyn ValueResolver> {
                let ($($r,)+) = self;
                vec![$($r as &dyn ValueResolver),+]
            }
        }
    };
}

impl_resolver_set!(A1 r1);
impl_resolver_set!(A1 r1, A2 r2);
impl_resolver_set!(A1 r1, A2 r2, A3 r3);
impl_resolver_set!(A1 r1, A2 r2, A3 r3, A4 r4);
impl_resolver_set!(A1 r1, A2 r2, A3 r3, A4 r4, A5 r5);
impl_resolver_set!(A1 r1, A2 r2, A3 r3, A4 r4, A5 r5, A6 r6);
impl_resolver_set!(A1 r1, A2 r2, A3 r3, A4 r4, A5 r5, A6 r6, A7 r7);
impl_resolver_set!(A1 r1, A2 r2, A3 r3, A4 r4, A5 r5, A6 r6, A7 r7, A8 r8);

macro_rules! impl_callback {
    ($($A:ident $a:ident),*) => {
        impl<F, R, E, $($A),*> Callback<($($A,)*), Structured<R, E>> for F
        where
            F: Fn($($A),*) -> Result<R, E> + Send + Sync + 'static,
            R: Serialize,
            E: Into<anyhow::Error>,
        {
            const OUTPUT: Output = Output::Structured;

            #[allow(unused_variables)]
            fn invoke(&self, args: ($($A,)*)) -> anyhow::Result<Option<Value>> {
                let ($($a,)*) = args;
                let out = (self)($($a),*).map_err(Into::<anyhow::Error>::into)?;
                let value = serde_json::to_value(&out).map_err(BindError::from)?;
                Ok(Some(value))
            }
        }

        impl<F, $($A),*> Callback<($($A,)*), SideEffect> for F
        where
            F: Fn($($A),*) + Send + Sync + 'static,
        {
            const OUTPUT: Output = Output::SideEffect;

            #[allow(unused_variables)]
            fn invoke(&self, args: ($($A,)*)) -> anyhow::Result<Option<Value>> {
                let ($($a,)*) = args;
                (self)($($a),*);
                Ok(None)
            }
        }
    };
}

impl_callback!();
impl_callback!(A1 a1);
impl_callback!(A1 a1, A2 a2);
impl_callback!(A1 a1, A2 a2, A3 a3);
impl_callback!(A1 a1, A2 a2, A3 a3, A4 a4);
impl_callback!(A1 a1, A2 a2, A3 a3, A4 a4, A5 a5);
impl_callback!(A1 a1, A2 a2, A3 a3, A4 a4, A5 a5, A6 a6);
impl_callback!(A1 a1, A2 a2, A3 a3, A4 a4, A5 a5, A6 a6, A7 a7);
impl_callback!(A1 a1, A2 a2, A3 a3, A4 a4, A5 a5, A6 a6, A7 a7, A8 a8);
