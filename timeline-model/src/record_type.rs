//! Well-known trace event names, categories and derived warning kinds.

use serde::Serialize;

pub const TASK: &str = "RunTask";
pub const PROGRAM: &str = "Program";
pub const EVENT_DISPATCH: &str = "EventDispatch";

pub const GPU_TASK: &str = "GPUTask";

pub const ANIMATION: &str = "Animation";
pub const REQUEST_MAIN_THREAD_FRAME: &str = "RequestMainThreadFrame";
pub const BEGIN_FRAME: &str = "BeginFrame";
pub const NEEDS_BEGIN_FRAME_CHANGED: &str = "NeedsBeginFrameChanged";
pub const BEGIN_MAIN_THREAD_FRAME: &str = "BeginMainThreadFrame";
pub const ACTIVATE_LAYER_TREE: &str = "ActivateLayerTree";
pub const DRAW_FRAME: &str = "DrawFrame";
pub const HIT_TEST: &str = "HitTest";
pub const SCHEDULE_STYLE_RECALCULATION: &str = "ScheduleStyleRecalculation";
pub const RECALCULATE_STYLES: &str = "RecalculateStyles";
pub const UPDATE_LAYOUT_TREE: &str = "UpdateLayoutTree";
pub const INVALIDATE_LAYOUT: &str = "InvalidateLayout";
pub const LAYOUT: &str = "Layout";
pub const UPDATE_LAYER: &str = "UpdateLayer";
pub const UPDATE_LAYER_TREE: &str = "UpdateLayerTree";
pub const PAINT_SETUP: &str = "PaintSetup";
pub const PAINT: &str = "Paint";
pub const PAINT_IMAGE: &str = "PaintImage";
pub const RASTERIZE: &str = "Rasterize";
pub const RASTER_TASK: &str = "RasterTask";
pub const SCROLL_LAYER: &str = "ScrollLayer";
pub const COMPOSITE_LAYERS: &str = "CompositeLayers";

pub const SCHEDULE_STYLE_INVALIDATION_TRACKING: &str = "ScheduleStyleInvalidationTracking";
pub const STYLE_RECALC_INVALIDATION_TRACKING: &str = "StyleRecalcInvalidationTracking";
pub const STYLE_INVALIDATOR_INVALIDATION_TRACKING: &str = "StyleInvalidatorInvalidationTracking";
pub const LAYOUT_INVALIDATION_TRACKING: &str = "LayoutInvalidationTracking";

pub const PARSE_HTML: &str = "ParseHTML";
pub const PARSE_AUTHOR_STYLE_SHEET: &str = "ParseAuthorStyleSheet";

pub const TIMER_INSTALL: &str = "TimerInstall";
pub const TIMER_REMOVE: &str = "TimerRemove";
pub const TIMER_FIRE: &str = "TimerFire";

pub const XHR_READY_STATE_CHANGE: &str = "XHRReadyStateChange";
pub const XHR_LOAD: &str = "XHRLoad";
pub const COMPILE_SCRIPT: &str = "v8.compile";
pub const EVALUATE_SCRIPT: &str = "EvaluateScript";
pub const COMPILE_MODULE: &str = "v8.compileModule";
pub const EVALUATE_MODULE: &str = "v8.evaluateModule";
pub const WASM_STREAM_FROM_RESPONSE_CALLBACK: &str = "v8.wasm.streamFromResponseCallback";
pub const WASM_COMPILED_MODULE: &str = "v8.wasm.compiledModule";
pub const WASM_CACHED_MODULE: &str = "v8.wasm.cachedModule";
pub const WASM_MODULE_CACHE_HIT: &str = "v8.wasm.moduleCacheHit";
pub const WASM_MODULE_CACHE_INVALID: &str = "v8.wasm.moduleCacheInvalid";

pub const FRAME_STARTED_LOADING: &str = "FrameStartedLoading";
pub const COMMIT_LOAD: &str = "CommitLoad";
pub const MARK_LOAD: &str = "MarkLoad";
pub const MARK_DOM_CONTENT: &str = "MarkDOMContent";
pub const MARK_FIRST_PAINT: &str = "firstPaint";
pub const MARK_FCP: &str = "firstContentfulPaint";
pub const MARK_FMP: &str = "firstMeaningfulPaint";

pub const TIME_STAMP: &str = "TimeStamp";
pub const CONSOLE_TIME: &str = "ConsoleTime";
pub const USER_TIMING: &str = "UserTiming";

pub const RESOURCE_SEND_REQUEST: &str = "ResourceSendRequest";
pub const RESOURCE_RECEIVE_RESPONSE: &str = "ResourceReceiveResponse";
pub const RESOURCE_RECEIVED_DATA: &str = "ResourceReceivedData";
pub const RESOURCE_FINISH: &str = "ResourceFinish";

pub const RUN_MICROTASKS: &str = "RunMicrotasks";
pub const FUNCTION_CALL: &str = "FunctionCall";
pub const GC_EVENT: &str = "GCEvent";
pub const MAJOR_GC: &str = "MajorGC";
pub const MINOR_GC: &str = "MinorGC";
pub const JS_FRAME: &str = "JSFrame";
pub const JS_SAMPLE: &str = "JSSample";
pub const V8_SAMPLE: &str = "V8Sample";
pub const JIT_CODE_ADDED: &str = "JitCodeAdded";
pub const JIT_CODE_MOVED: &str = "JitCodeMoved";
pub const PARSE_SCRIPT_ON_BACKGROUND: &str = "v8.parseOnBackground";
pub const V8_EXECUTE: &str = "V8.Execute";

pub const UPDATE_COUNTERS: &str = "UpdateCounters";

pub const REQUEST_ANIMATION_FRAME: &str = "RequestAnimationFrame";
pub const CANCEL_ANIMATION_FRAME: &str = "CancelAnimationFrame";
pub const FIRE_ANIMATION_FRAME: &str = "FireAnimationFrame";

pub const REQUEST_IDLE_CALLBACK: &str = "RequestIdleCallback";
pub const CANCEL_IDLE_CALLBACK: &str = "CancelIdleCallback";
pub const FIRE_IDLE_CALLBACK: &str = "FireIdleCallback";

pub const WEB_SOCKET_CREATE: &str = "WebSocketCreate";
pub const WEB_SOCKET_SEND_HANDSHAKE_REQUEST: &str = "WebSocketSendHandshakeRequest";
pub const WEB_SOCKET_RECEIVE_HANDSHAKE_RESPONSE: &str = "WebSocketReceiveHandshakeResponse";
pub const WEB_SOCKET_DESTROY: &str = "WebSocketDestroy";

pub const EMBEDDER_CALLBACK: &str = "EmbedderCallback";

pub const SET_LAYER_TREE_ID: &str = "SetLayerTreeId";
pub const TRACING_STARTED_IN_PAGE: &str = "TracingStartedInPage";
pub const TRACING_SESSION_ID_FOR_WORKER: &str = "TracingSessionIdForWorker";

pub const DECODE_IMAGE: &str = "Decode Image";
pub const RESIZE_IMAGE: &str = "Resize Image";
pub const DRAW_LAZY_PIXEL_REF: &str = "Draw LazyPixelRef";
pub const DECODE_LAZY_PIXEL_REF: &str = "Decode LazyPixelRef";

pub const LAZY_PIXEL_REF: &str = "LazyPixelRef";
pub const LAYER_TREE_HOST_IMPL_SNAPSHOT: &str = "cc::LayerTreeHostImpl";
pub const PICTURE_SNAPSHOT: &str = "cc::Picture";
pub const DISPLAY_ITEM_LIST_SNAPSHOT: &str = "cc::DisplayItemList";
pub const LATENCY_INFO: &str = "LatencyInfo";
pub const LATENCY_INFO_FLOW: &str = "LatencyInfo.Flow";
pub const INPUT_LATENCY_MOUSE_MOVE: &str = "InputLatency::MouseMove";
pub const INPUT_LATENCY_MOUSE_WHEEL: &str = "InputLatency::MouseWheel";
pub const IMPL_SIDE_FLING: &str = "InputHandlerProxy::HandleGestureFling::started";
pub const GC_COLLECT_GARBAGE: &str = "BlinkGC.AtomicPhase";

pub const CRYPTO_DO_ENCRYPT: &str = "DoEncrypt";
pub const CRYPTO_DO_ENCRYPT_REPLY: &str = "DoEncryptReply";
pub const CRYPTO_DO_DECRYPT: &str = "DoDecrypt";
pub const CRYPTO_DO_DECRYPT_REPLY: &str = "DoDecryptReply";
pub const CRYPTO_DO_DIGEST: &str = "DoDigest";
pub const CRYPTO_DO_DIGEST_REPLY: &str = "DoDigestReply";
pub const CRYPTO_DO_SIGN: &str = "DoSign";
pub const CRYPTO_DO_SIGN_REPLY: &str = "DoSignReply";
pub const CRYPTO_DO_VERIFY: &str = "DoVerify";
pub const CRYPTO_DO_VERIFY_REPLY: &str = "DoVerifyReply";

/// Virtual event carrying a whole CPU profile inside a trace.
pub const CPU_PROFILE: &str = "CpuProfile";
pub const PROFILE: &str = "Profile";
pub const PROFILE_CHUNK: &str = "ProfileChunk";

pub const ASYNC_TASK: &str = "AsyncTask";

/// Legacy task name emitted by synthetic traces.
pub const MESSAGE_LOOP_RUN_TASK: &str = "MessageLoop::RunTask";

pub mod category {
    pub const CONSOLE: &str = "blink.console";
    pub const USER_TIMING: &str = "blink.user_timing";
    pub const LATENCY_INFO: &str = "latencyInfo";

    pub const LEGACY_TOP_LEVEL: &str = "toplevel";
    pub const DEVTOOLS_METADATA: &str = "disabled-by-default-devtools.timeline";
    pub const DEVTOOLS_TIMELINE: &str = "disabled-by-default-devtools.timeline";
    pub const FRAME_LIFECYCLE: &str = "cc,devtools";
}

/// Metadata events DevTools writes into a trace to describe the session.
pub mod devtools_metadata {
    pub const TRACING_STARTED_IN_BROWSER: &str = "TracingStartedInBrowser";
    pub const TRACING_STARTED_IN_PAGE: &str = "TracingStartedInPage";
    pub const TRACING_SESSION_ID_FOR_WORKER: &str = "TracingSessionIdForWorker";
    pub const FRAME_COMMITTED_IN_BROWSER: &str = "FrameCommittedInBrowser";
    pub const PROCESS_READY_IN_BROWSER: &str = "ProcessReadyInBrowser";
    pub const FRAME_DELETED_IN_BROWSER: &str = "FrameDeletedInBrowser";
}

pub mod thread_name {
    pub const WORKER: &str = "DedicatedWorker thread";
    pub const WORKER_LEGACY: &str = "DedicatedWorker Thread";
    pub const RENDERER_MAIN: &str = "CrRendererMain";
    pub const BROWSER_MAIN: &str = "CrBrowserMain";
    pub const GPU_MAIN: &str = "CrGpuMain";
    pub const GPU_PROCESS: &str = "GPU Process";
    pub const COMPOSITOR_TILE_WORKER_PREFIX: &str = "CompositorTileWorker";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum WarningType {
    LongTask,
    ForcedStyle,
    ForcedLayout,
    IdleDeadlineExceeded,
    LongHandler,
    LongRecurringHandler,
    V8Deopt,
}
