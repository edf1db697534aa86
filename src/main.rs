// Módulos de la aplicación
mod api;
mod app_state;
mod config;
mod conversation;
mod error;
mod highlight;
mod listing;
mod location;
mod models;
mod navigator;
mod preferences;
mod prefix_memory;
mod preview;
mod qa_client;
mod span_matcher;
mod view;

use crate::{
    app_state::{AppState, Status},
    conversation::Conversation,
    listing::S3Lister,
    navigator::{Navigator, NavigatorService},
    preferences::PreferencesStore,
    prefix_memory::PrefixMemory,
    preview::PreviewPane,
    qa_client::QaClient,
};
use axum::Router;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // 1. Cargar .env e inicializar logging
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // 2. Cargar configuración y preferencias
    let cfg = config::AppConfig::from_env().expect("Error al cargar la configuración");
    let preferences = Arc::new(PreferencesStore::new(cfg.preferences_path.clone()));
    let prefs = preferences.load_or_default();
    info!("Preferencias en {}", preferences.path().display());

    // 3. Cliente HTTP compartido (listados, resúmenes, documentos)
    let http = reqwest::Client::builder()
        .timeout(cfg.request_timeout)
        .build()
        .expect("Error creando el cliente HTTP");

    // 4. Navegador: cliente de listado + memoria de prefijos
    let lister = Arc::new(S3Lister::new(
        http.clone(),
        cfg.object_store_url.clone(),
        &cfg.object_store_public_url,
    ));
    let memory = Arc::new(PrefixMemory::new(preferences.clone(), &cfg.known_folders));
    let navigator = Arc::new(NavigatorService::new(
        Navigator::from_preferences(&prefs, cfg.listing_failure_policy),
        lister,
        memory,
        Some(preferences.clone()),
    ));

    // Primer listado en segundo plano: un fallo sólo deja el aviso de error.
    {
        let navigator = navigator.clone();
        let start = prefs.start_location();
        tokio::spawn(async move {
            navigator.navigate_to(start).await;
        });
    }

    // Crear canal para la señal de apagado.
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    // 5. Crear estado compartido de la aplicación
    let app_state = AppState {
        config: cfg.clone(),
        qa: Arc::new(QaClient::new(http.clone(), cfg.qa_service_url.clone())),
        http,
        navigator,
        preferences,
        conversation: Arc::new(Mutex::new(Conversation::new())),
        preview: Arc::new(PreviewPane::default()),
        status: Arc::new(Mutex::new(Status {
            is_busy: false,
            message: "Servidor listo.".to_string(),
        })),
        shutdown_sender: Arc::new(Mutex::new(Some(shutdown_tx))),
    };

    // 6. Configurar el router de la API y el servicio de ficheros estáticos
    let app = Router::new()
        .merge(api::create_router(app_state.clone()))
        .fallback_service(ServeDir::new("frontend"))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    // 7. Iniciar el servidor
    let server_addr = &app_state.config.server_addr;
    let listener = tokio::net::TcpListener::bind(server_addr)
        .await
        .expect("No se pudo abrir la dirección del servidor");
    let server_url = format!("http://{}", server_addr);
    info!("🚀 Servidor escuchando en {}", &server_url);

    // Abrir el frontend en el navegador por defecto
    if webbrowser::open(&server_url).is_err() {
        info!("No se pudo abrir el navegador. Por favor, accede a {} manualmente.", server_url);
    }

    // Configurar el apagado ordenado.
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_rx.await.ok();
            info!("Señal de apagado recibida, iniciando cierre del servidor.");
        })
        .await
        .expect("Error en el servidor");

    info!("✅ Servidor cerrado correctamente.");
}
