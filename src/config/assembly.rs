//! Turns an [`EngineConfig`] into a populated [`Context`].
use std::sync::Arc;

use eyre::{Result, WrapErr};

use crate::{
    adapters::{FileComponent, HttpComponent, MemoryComponent, file, http, memory},
    config::models::{ComponentsConfig, EngineConfig, RouteDefinition, StepConfig},
    core::{Context, Route, Value},
};

/// Register the built-in components enabled in `config`.
pub async fn register_builtin_components(ctx: &Context, config: &ComponentsConfig) {
    if config.memory {
        ctx.add_component(memory::SCHEME, Arc::new(MemoryComponent::new()))
            .await;
    }
    if config.file {
        ctx.add_component(file::SCHEME, Arc::new(FileComponent::new()))
            .await;
    }
    if config.http {
        let component = Arc::new(HttpComponent::new());
        ctx.add_component(http::SCHEME, component.clone()).await;
        ctx.add_component("https", component).await;
    }
}

/// Build every configured route into `ctx`. Components must already be registered.
pub async fn build_routes(ctx: &Context, config: &EngineConfig) -> Result<Vec<Arc<Route>>> {
    let mut routes = Vec::with_capacity(config.routes.len());
    for definition in &config.routes {
        let route = build_route(ctx, definition)
            .await
            .wrap_err_with(|| format!("Failed to build route '{}'", definition.id))?;
        routes.push(route);
    }
    Ok(routes)
}

async fn build_route(
    ctx: &Context,
    definition: &RouteDefinition,
) -> crate::core::Result<Arc<Route>> {
    let mut builder = ctx.create_route_builder();
    builder.set_id(definition.id.clone());
    if let Some(description) = &definition.description {
        builder.set_description(description.clone());
    }
    if let Some(group) = &definition.group {
        builder.set_group(group.clone());
    }

    let bound = builder.from(&definition.from).await.map(|_| ());
    if let Err(e) = bound {
        // keep the context free of half-built routes
        ctx.remove_route(builder.route());
        return Err(e);
    }

    for step in &definition.steps {
        let added = match step {
            StepConfig::SetBody { value } => {
                builder.set_body(Value::from(value.clone()));
                Ok(())
            }
            StepConfig::SetHeader { name, value } => {
                builder.set_header(name.clone(), Value::from(value.clone()));
                Ok(())
            }
            StepConfig::RemoveHeader { name } => {
                builder.remove_header(name.clone());
                Ok(())
            }
            StepConfig::SetProperty { name, value } => {
                builder.set_property(name.clone(), Value::from(value.clone()));
                Ok(())
            }
            StepConfig::Log { message } => {
                builder.log(message.clone());
                Ok(())
            }
            StepConfig::LogBody => {
                builder.log_body();
                Ok(())
            }
            StepConfig::LogHeaders => {
                builder.log_headers();
                Ok(())
            }
            StepConfig::To { uri } => builder.to(uri).await.map(|_| ()),
        };
        if let Err(e) = added {
            ctx.remove_route(builder.route());
            return Err(e);
        }
    }

    Ok(builder.build())
}

/// Create a context named after `config`, register its components and build its routes.
pub async fn assemble(config: &EngineConfig) -> Result<Context> {
    let ctx = Context::with_name(config.name.clone());
    register_builtin_components(&ctx, &config.components).await;
    build_routes(&ctx, config).await?;

    tracing::info!(
        context = %ctx.name(),
        routes = ctx.route_count(),
        components = ctx.registry().len(),
        "Context assembled from configuration"
    );
    Ok(ctx)
}
