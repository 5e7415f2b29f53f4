//! Route definitions for the Doorworks ERP API

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use crate::handlers::{
    accounts, admin, auth, billing, dispatch, logistics, master, production, purchase, quality,
    sales, site, supervisor,
};
use crate::{middleware::auth_middleware, AppState};

/// Create API routes
pub fn api_routes(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/auth/logout", post(auth::logout))
        .route("/auth/me", get(auth::me))
        .merge(admin_routes())
        .merge(master_routes())
        .nest("/sales", sales_routes())
        .nest("/production", production_routes())
        .nest("/supervisor", supervisor_routes())
        .nest("/quality", quality_routes())
        .nest("/billing", billing_routes())
        .nest("/dispatch", dispatch_routes())
        .nest("/logistics", logistics_routes())
        .nest("/accounts", accounts_routes())
        .nest("/purchase", purchase_routes())
        .nest("/site", site_routes())
        .route_layer(middleware::from_fn_with_state(state, auth_middleware));

    Router::new()
        // Health check (public)
        .route("/health", get(crate::handlers::health_check))
        // Auth routes (public)
        .nest("/auth", auth_routes())
        .merge(protected)
}

/// Authentication routes (public)
fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/refresh", post(auth::refresh))
}

/// Users, departments and supervisors
fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(admin::list_users).post(admin::create_user))
        .route(
            "/users/:id",
            get(admin::get_user)
                .put(admin::update_user)
                .delete(admin::delete_user),
        )
        .route(
            "/departments",
            get(admin::list_departments).post(admin::create_department),
        )
        .route(
            "/departments/:id",
            get(admin::get_department)
                .put(admin::update_department)
                .delete(admin::delete_department),
        )
        .route(
            "/supervisors",
            get(admin::list_supervisors).post(admin::create_supervisor),
        )
        .route(
            "/supervisors/:id",
            get(admin::get_supervisor)
                .put(admin::update_supervisor)
                .delete(admin::delete_supervisor),
        )
}

/// Parties, products, designs, stage definitions and suppliers
fn master_routes() -> Router<AppState> {
    Router::new()
        .route("/parties", get(master::list_parties).post(master::create_party))
        .route(
            "/parties/:id",
            get(master::get_party)
                .put(master::update_party)
                .delete(master::delete_party),
        )
        .route("/parties/:id/submit", post(master::submit_party))
        .route("/parties/:id/approve", post(master::approve_party))
        .route("/parties/:id/history", get(master::party_history))
        .route("/products", get(master::list_products).post(master::create_product))
        .route(
            "/products/:id",
            get(master::get_product)
                .put(master::update_product)
                .delete(master::delete_product),
        )
        .route("/designs", get(master::list_designs).post(master::create_design))
        .route(
            "/designs/:id",
            put(master::update_design).delete(master::delete_design),
        )
        .route("/stages", get(master::list_stages).post(master::create_stage))
        .route(
            "/stages/:id",
            put(master::update_stage).delete(master::delete_stage),
        )
        .route(
            "/suppliers",
            get(master::list_suppliers).post(master::create_supplier),
        )
        .route(
            "/suppliers/:id",
            put(master::update_supplier).delete(master::delete_supplier),
        )
}

fn sales_routes() -> Router<AppState> {
    Router::new()
        .route("/leads", get(sales::list_leads).post(sales::create_lead))
        .route(
            "/leads/:id",
            get(sales::get_lead)
                .put(sales::update_lead)
                .delete(sales::delete_lead),
        )
        .route("/leads/:id/convert", post(sales::convert_lead))
        .route("/projects", get(sales::list_projects).post(sales::create_project))
        .route(
            "/projects/:id",
            get(sales::get_project)
                .put(sales::update_project)
                .delete(sales::delete_project),
        )
        .route(
            "/quotations",
            get(sales::list_quotations).post(sales::create_quotation),
        )
        .route(
            "/quotations/:id",
            get(sales::get_quotation)
                .put(sales::update_quotation)
                .delete(sales::delete_quotation),
        )
        .route(
            "/quotations/:id/approve-discount",
            post(sales::approve_discount),
        )
        .route("/orders", get(sales::list_orders).post(sales::create_order))
        .route("/orders/:id", get(sales::get_order).put(sales::update_order))
        .route("/orders/:id/status", put(sales::update_order_status))
        .route(
            "/measurement-requests",
            get(sales::list_measurement_requests),
        )
        .route(
            "/measurement-requests/:id",
            get(sales::get_measurement_request).put(sales::update_measurement_request),
        )
        .route(
            "/follow-ups",
            get(sales::list_follow_ups).post(sales::create_follow_up),
        )
        .route(
            "/follow-ups/:id",
            put(sales::update_follow_up).delete(sales::delete_follow_up),
        )
        .route("/dashboard", get(sales::sales_dashboard))
}

fn production_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/measurements",
            get(production::list_measurements).post(production::create_measurement),
        )
        .route(
            "/measurements/next-number",
            get(production::next_measurement_number),
        )
        .route(
            "/measurements/next-serial-number",
            get(production::next_serial_number),
        )
        .route(
            "/measurements/:id",
            get(production::get_measurement)
                .put(production::update_measurement)
                .delete(production::delete_measurement),
        )
        .route(
            "/measurements/:id/approve",
            post(production::approve_measurement),
        )
        .route(
            "/measurements/:id/reject",
            post(production::reject_measurement),
        )
        .route(
            "/measurements/:id/recover",
            post(production::recover_measurement),
        )
        .route(
            "/measurement-tasks",
            get(production::list_measurement_tasks).post(production::create_measurement_task),
        )
        .route(
            "/measurement-tasks/:id/status",
            put(production::update_measurement_task_status),
        )
        .route(
            "/papers",
            get(production::list_papers).post(production::create_paper),
        )
        .route("/papers/next-number", get(production::next_paper_number))
        .route(
            "/papers/:id",
            get(production::get_paper)
                .put(production::update_paper)
                .delete(production::delete_paper),
        )
        .route("/papers/:id/status", put(production::update_paper_status))
        .route("/papers/:id/recover", post(production::recover_paper))
        .route(
            "/papers/:id/raw-material-check",
            post(production::record_raw_material_check),
        )
        .route(
            "/papers/:id/stages",
            get(production::list_stages).post(production::add_stage),
        )
        .route(
            "/stages/:id/status",
            put(production::update_stage_status),
        )
        .route(
            "/schedules",
            get(production::list_schedules).post(production::create_schedule),
        )
        .route(
            "/schedules/:id",
            get(production::get_schedule).put(production::update_schedule),
        )
        .route(
            "/schedules/:id/status",
            put(production::update_schedule_status),
        )
}

fn supervisor_routes() -> Router<AppState> {
    Router::new()
        .route("/tasks", get(supervisor::list_tasks))
        .route("/tasks/:id", get(supervisor::get_task))
        .route("/tasks/:id/accept", post(supervisor::accept_task))
        .route("/tasks/:id/reject", post(supervisor::reject_task))
        .route("/tasks/:id/pause", post(supervisor::pause_task))
        .route("/tasks/:id/resume", post(supervisor::resume_task))
        .route("/tasks/:id/complete", post(supervisor::complete_task))
        .route(
            "/tasks/:id/progress",
            get(supervisor::task_progress).post(supervisor::record_progress),
        )
        .route(
            "/issues",
            get(supervisor::list_issues).post(supervisor::report_issue),
        )
        .route("/issues/:id", put(supervisor::update_issue))
        .route("/dashboard", get(supervisor::supervisor_dashboard))
}

fn quality_routes() -> Router<AppState> {
    Router::new()
        .route("/checks", get(quality::list_checks).post(quality::create_check))
        .route("/checks/next-number", get(quality::next_check_number))
        .route("/checks/:id", get(quality::get_check))
        .route("/checks/:id/approve", post(quality::approve_check))
        .route("/checks/:id/reject", post(quality::reject_check))
        .route("/pending-papers", get(quality::pending_papers))
        .route("/history", get(quality::history))
        .route("/stats", get(quality::stats))
        .route("/rework", get(quality::list_rework).post(quality::create_rework))
        .route("/rework/:id", put(quality::update_rework))
        .route(
            "/certificates",
            get(quality::list_certificates).post(quality::issue_certificate),
        )
}

fn billing_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/requests",
            get(billing::list_requests).post(billing::create_request),
        )
        .route("/requests/:id", get(billing::get_request))
        .route(
            "/challans",
            get(billing::list_challans).post(billing::create_challan),
        )
        .route(
            "/challans/:id",
            get(billing::get_challan).put(billing::update_challan),
        )
        .route("/challans/:id/approve", post(billing::approve_challan))
        .route(
            "/invoices",
            get(billing::list_invoices).post(billing::create_invoice),
        )
        .route(
            "/invoices/:id",
            get(billing::get_invoice).put(billing::update_invoice),
        )
        .route("/invoices/:id/approve", post(billing::approve_invoice))
        .route(
            "/invoices/:id/send-to-dispatch",
            post(billing::send_to_dispatch),
        )
        .route("/dashboard", get(billing::billing_dashboard))
}

fn dispatch_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(dispatch::list_dispatches).post(dispatch::create_dispatch),
        )
        .route("/ready", get(dispatch::ready_for_dispatch))
        .route("/dashboard", get(dispatch::dispatch_dashboard))
        .route(
            "/:id",
            get(dispatch::get_dispatch).put(dispatch::update_dispatch),
        )
        .route("/:id/approve", post(dispatch::approve_dispatch))
        .route("/:id/dispatched", post(dispatch::mark_dispatched))
        .route(
            "/:id/tracking",
            get(dispatch::get_tracking).put(dispatch::update_tracking),
        )
        .route("/gate-passes/:number", get(dispatch::get_gate_pass))
        .route(
            "/gate-passes/:number/verify",
            post(dispatch::verify_gate_pass),
        )
}

fn logistics_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/vehicles",
            get(logistics::list_vehicles).post(logistics::create_vehicle),
        )
        .route(
            "/vehicles/:id",
            get(logistics::get_vehicle)
                .put(logistics::update_vehicle)
                .delete(logistics::delete_vehicle),
        )
        .route(
            "/drivers",
            get(logistics::list_drivers).post(logistics::create_driver),
        )
        .route(
            "/drivers/:id",
            get(logistics::get_driver)
                .put(logistics::update_driver)
                .delete(logistics::delete_driver),
        )
        .route(
            "/assignments",
            get(logistics::list_assignments).post(logistics::assign_vehicle),
        )
        .route(
            "/assignments/:id",
            get(logistics::get_assignment).put(logistics::update_assignment),
        )
        .route(
            "/issues",
            get(logistics::list_issues).post(logistics::report_issue),
        )
        .route("/issues/:id", put(logistics::update_issue))
        .route("/summary", get(logistics::logistics_summary))
}

fn accounts_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/receipts",
            get(accounts::list_receipts).post(accounts::create_receipt),
        )
        .route("/receipts/:id", get(accounts::get_receipt))
        .route(
            "/receipts/:id/status",
            put(accounts::update_receipt_status),
        )
        .route(
            "/receipts/:id/allocations",
            get(accounts::list_allocations),
        )
        .route("/allocations", post(accounts::allocate_payment))
        .route("/receivables", get(accounts::list_receivables))
        .route(
            "/receivables/refresh",
            post(accounts::refresh_receivables),
        )
        .route(
            "/reconciliations",
            get(accounts::list_reconciliations).post(accounts::create_reconciliation),
        )
        .route("/reconciliations/:id", get(accounts::get_reconciliation))
        .route(
            "/reconciliations/:id/approve",
            post(accounts::approve_reconciliation),
        )
        .route("/reports/aging", get(accounts::aging_report))
        .route("/reports/aging.csv", get(accounts::aging_csv))
        .route("/dashboard", get(accounts::accounts_dashboard))
}

fn purchase_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/vendors",
            get(purchase::list_vendors).post(purchase::create_vendor),
        )
        .route(
            "/vendors/:id",
            get(purchase::get_vendor)
                .put(purchase::update_vendor)
                .delete(purchase::delete_vendor),
        )
        .route(
            "/requisitions",
            get(purchase::list_requisitions).post(purchase::create_requisition),
        )
        .route(
            "/requisitions/:id",
            get(purchase::get_requisition).put(purchase::update_requisition),
        )
        .route(
            "/requisitions/:id/submit",
            post(purchase::submit_requisition),
        )
        .route(
            "/requisitions/:id/approve",
            post(purchase::approve_requisition),
        )
        .route(
            "/requisitions/:id/reject",
            post(purchase::reject_requisition),
        )
        .route("/orders", get(purchase::list_orders).post(purchase::create_order))
        .route("/orders/:id", get(purchase::get_order))
        .route("/orders/:id/approve", post(purchase::approve_order))
        .route("/orders/:id/send", post(purchase::send_order))
        .route("/grns", get(purchase::list_grns).post(purchase::create_grn))
        .route("/grns/:id", get(purchase::get_grn))
        .route("/grns/:id/approve", post(purchase::approve_grn))
        .route("/grns/:id/reject", post(purchase::reject_grn))
        .route(
            "/returns",
            get(purchase::list_returns).post(purchase::create_return),
        )
        .route("/bills", get(purchase::list_bills).post(purchase::create_bill))
        .route("/bills/:id", get(purchase::get_bill))
        .route("/bills/:id/status", put(purchase::update_bill_status))
        .route("/dashboard", get(purchase::purchase_dashboard))
}

fn site_routes() -> Router<AppState> {
    Router::new()
        .route("/sites", get(site::list_sites).post(site::create_site))
        .route(
            "/sites/:id",
            get(site::get_site)
                .put(site::update_site)
                .delete(site::delete_site),
        )
        .route("/sites/:id/progress", get(site::list_progress))
        .route("/sites/:id/photos", get(site::list_photos))
        .route("/sites/:id/dashboard", get(site::site_dashboard))
        .route("/sites/:id/fixing-gap", get(site::fixing_gap))
        .route("/sites/:id/wing-completion", get(site::wing_completion))
        .route("/sites/:id/flat-pending", get(site::flat_pending))
        .route("/flats", get(site::list_flats).post(site::create_flat))
        .route(
            "/flats/:id",
            get(site::get_flat)
                .put(site::update_flat)
                .delete(site::delete_flat),
        )
        .route("/flats/:id/measurements", get(site::list_measurements))
        .route("/flats/:id/frame-fixings", get(site::list_frame_fixings))
        .route("/flats/:id/door-fixings", get(site::list_door_fixings))
        .route("/measurements", post(site::create_measurement))
        .route(
            "/measurements/:id/status",
            put(site::update_measurement_status),
        )
        .route("/frame-fixings", post(site::record_frame_fixing))
        .route("/frame-fixings/:id", put(site::update_frame_fixing))
        .route("/door-fixings", post(site::record_door_fixing))
        .route("/door-fixings/:id", put(site::update_door_fixing))
        .route("/progress", post(site::report_progress))
        .route("/issues", get(site::list_issues).post(site::raise_issue))
        .route("/issues/:id", put(site::update_issue))
        .route("/photos", post(site::add_photo))
        .route(
            "/captains",
            get(site::list_captains).post(site::assign_captain),
        )
        .route("/my-flats", get(site::my_flats))
}
