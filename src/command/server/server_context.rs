use std::sync::Arc;

use hyper::Response;
use tracing::instrument;

use crate::auth::exec_chain;
use crate::auth::mechanism::build_mechanisms;
use crate::cache::IdentityCache;
use crate::command::server::error::Error;
use crate::configuration::Configuration;
use crate::pipeline::{Pipeline, RequestContext, ResponseBody};

/// Everything a connection needs to process requests, swapped as a whole on reload
pub struct ServerContext {
    pipeline: Pipeline,
}

impl ServerContext {
    pub fn new(config: &Configuration, identity_cache: &Arc<IdentityCache>) -> Result<Self, Error> {
        let mechanisms = build_mechanisms(&config.chain, &config.mechanism, identity_cache)?;

        let mut pipeline = Pipeline::new();
        exec_chain(
            &mut pipeline,
            mechanisms,
            config.chain.on_mechanism_error,
            None,
        )?;

        Ok(Self { pipeline })
    }

    /// Runs the request through the authentication chain.
    ///
    /// Returns the response terminating the request, if any; otherwise `request.authorized`
    /// holds the accepted identity, or nothing when the request passed anonymously.
    #[instrument(skip_all)]
    pub async fn authenticate_request(
        &self,
        request: &mut RequestContext,
    ) -> Option<Response<ResponseBody>> {
        self.pipeline.run(request).await
    }
}
