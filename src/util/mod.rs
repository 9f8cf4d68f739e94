use std::{
    future::Future,
    time::Duration,
};

mod seq;

pub use seq::{
    Seq,
    U16Sequence,
};

#[inline]
#[tracing::instrument(skip(f), level = "trace")]
pub async fn timeout<T>(after: Duration, f: impl Future<Output = T>) -> Option<T> {
    either(f, smol::Timer::after(after)).await.left()
}

#[inline]
pub async fn either<T, U>(
    t: impl Future<Output = T>,
    u: impl Future<Output = U>,
) -> either::Either<T, U> {
    smol::future::or(async move { either::Left(t.await) }, async move { either::Right(u.await) })
        .await
}
