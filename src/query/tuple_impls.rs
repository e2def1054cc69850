use std::ops::Range;

use super::{Fetch, FetchContext, FetchItem, QueryFn, Signature};
use crate::entity::ArchetypeEntityIndex;
use crate::event::EventRef;

macro_rules! impl_query_fn {
    ($($ty:ident $var:ident $state:ident,)*) => {
        impl<Func, $($ty: Fetch,)*> QueryFn<fn($($ty,)*)> for Func
        where
            for<'f> &'f mut Func: FnMut($($ty),*) + FnMut($(FetchItem<'_, $ty>),*),
        {
            fn describe(#[allow(unused_variables)] signature: &mut Signature) {
                $($ty::describe(signature);)*
            }

            fn accepts(#[allow(unused_variables)] event: Option<EventRef<'_>>) -> bool {
                true $(&& $ty::accepts(event))*
            }

            fn run(&mut self, context: &FetchContext<'_>, chunk: u32, range: Range<u32>) {
                // Passing `&mut Func` through a generic function
                // selects the `FnMut` implementation over the item types.
                #[allow(clippy::too_many_arguments)]
                fn call_inner<$($ty,)*>(mut func: impl FnMut($($ty),*), $($var: $ty,)*) {
                    func($($var),*);
                }

                $(let $state = $ty::prepare(context.archetype);)*
                let _borrows = ($($ty::borrow(context.archetype, $state),)*);
                for in_chunk in range {
                    #[allow(unused_variables)]
                    let index = ArchetypeEntityIndex::new(chunk, in_chunk);
                    // Safety: the signature rejects aliased mutable access within the callable,
                    // `_borrows` rejects it across nested runs,
                    // and the world is locked against structural changes while callables run.
                    $(let $var = unsafe { $ty::fetch($state, context, index) };)*
                    call_inner(&mut *self, $($var),*);
                }
            }
        }
    };
}

macro_rules! impl_query_fn_accumulate {
    () => {
        impl_query_fn!();
    };
    (
        $first_ty:ident $first_var:ident $first_state:ident,
        $($rest_ty:ident $rest_var:ident $rest_state:ident,)*
    ) => {
        impl_query_fn_accumulate!($($rest_ty $rest_var $rest_state,)*);
        impl_query_fn!($first_ty $first_var $first_state, $($rest_ty $rest_var $rest_state,)*);
    };
}

#[cfg(not(feature = "tuple-impl-12-query"))]
impl_query_fn_accumulate!(
    P0 p0 s0, P1 p1 s1, P2 p2 s2, P3 p3 s3, P4 p4 s4, P5 p5 s5, P6 p6 s6, P7 p7 s7,
);

#[cfg(all(feature = "tuple-impl-12-query", not(feature = "tuple-impl-16-query")))]
impl_query_fn_accumulate!(
    P0 p0 s0, P1 p1 s1, P2 p2 s2, P3 p3 s3, P4 p4 s4, P5 p5 s5, P6 p6 s6, P7 p7 s7,
    P8 p8 s8, P9 p9 s9, P10 p10 s10, P11 p11 s11,
);

#[cfg(feature = "tuple-impl-16-query")]
impl_query_fn_accumulate!(
    P0 p0 s0, P1 p1 s1, P2 p2 s2, P3 p3 s3, P4 p4 s4, P5 p5 s5, P6 p6 s6, P7 p7 s7,
    P8 p8 s8, P9 p9 s9, P10 p10 s10, P11 p11 s11, P12 p12 s12, P13 p13 s13, P14 p14 s14,
    P15 p15 s15,
);
