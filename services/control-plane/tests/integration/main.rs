mod contract_test;
mod dispatch_test;
mod tenant_test;
